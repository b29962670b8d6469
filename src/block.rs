//! Self-describing block envelope, the unit of storage.
//!
//! Wire layout (all integers big-endian):
//!
//! ```text
//! [ total_len: u32 | kind: u8 | compression: u8 | cipher: u8 | payload_len: u32 ]
//! [ payload = encrypt(compress(data)) | trailer, stored raw ]
//! ```
//!
//! `total_len` counts the whole block, header included, so a reader can walk
//! a store block by block with nothing but this prefix. The trailer length
//! is implied: `total_len - 11 - payload_len`.

use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::codec::{CodecError, CompressionId, Compressor};
use crate::crypto::{CipherId, CipherSuite, CryptoError};

pub const BLOCK_HEADER_SIZE: usize = 11;

/// What a block's decoded payload contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockKind {
    /// JSON report metadata.
    Metadata = 1,
    /// A page container plus its shape trailer.
    Pages = 2,
}

impl BlockKind {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(BlockKind::Metadata),
            2 => Some(BlockKind::Pages),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub total_len: u32,
    pub kind: u8,
    pub compression: u8,
    pub cipher: u8,
    pub payload_len: u32,
}

impl BlockHeader {
    pub fn write<W: io::Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<BigEndian>(self.total_len)?;
        writer.write_u8(self.kind)?;
        writer.write_u8(self.compression)?;
        writer.write_u8(self.cipher)?;
        writer.write_u32::<BigEndian>(self.payload_len)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        Ok(Self {
            total_len: reader.read_u32::<BigEndian>()?,
            kind: reader.read_u8()?,
            compression: reader.read_u8()?,
            cipher: reader.read_u8()?,
            payload_len: reader.read_u32::<BigEndian>()?,
        })
    }
}

/// A fully decoded block: cleartext data plus the raw trailer.
#[derive(Debug)]
pub struct DecodedBlock {
    pub kind: u8,
    pub compression: CompressionId,
    pub cipher: CipherId,
    pub total_len: u32,
    pub data: Vec<u8>,
    pub trailer: Vec<u8>,
}

/// Serialize one block: compress, then encrypt, then frame.
///
/// The trailer rides after the payload uncompressed and unencrypted, so a
/// reader can reach it without decoding the payload. A block whose framed
/// size cannot fit the u32 header fields is refused.
pub fn encode_block(
    kind: BlockKind,
    compressor: &Compressor,
    cipher: &mut CipherSuite,
    data: &[u8],
    trailer: &[u8],
) -> Result<Vec<u8>, BlockError> {
    let compressed = compressor.compress(data)?;
    let payload = cipher.encrypt(&compressed)?;
    let (total_len, payload_len) = header_lengths(payload.len(), trailer.len())?;
    let header = BlockHeader {
        total_len,
        kind: kind as u8,
        compression: compressor.id().id(),
        cipher: cipher.id().id(),
        payload_len,
    };
    let mut out = Vec::with_capacity(total_len as usize);
    header.write(&mut out)?;
    out.extend_from_slice(&payload);
    out.extend_from_slice(trailer);
    Ok(out)
}

/// The two length fields of a block header. The payload length always fits
/// once the total does, so one check bounds both.
fn header_lengths(payload_len: usize, trailer_len: usize) -> Result<(u32, u32), BlockError> {
    let total = BLOCK_HEADER_SIZE as u64 + payload_len as u64 + trailer_len as u64;
    match u32::try_from(total) {
        Ok(total_len) => Ok((total_len, payload_len as u32)),
        Err(_) => Err(BlockError::Oversize { len: total }),
    }
}

/// Decode one block from a buffer that starts at its header.
///
/// Ids are resolved strictly: a block naming an unregistered compression or
/// cipher is an error, never a silent fallback. `offset` is the block's
/// position in the store and is only used in error reports; in-memory
/// callers pass 0.
pub fn decode_block(
    buf: &[u8],
    cipher: &mut CipherSuite,
    offset: u64,
) -> Result<DecodedBlock, BlockError> {
    if buf.len() < BLOCK_HEADER_SIZE {
        return Err(BlockError::Truncated {
            offset,
            expected: BLOCK_HEADER_SIZE as u64,
            actual: buf.len() as u64,
        });
    }
    let header = BlockHeader::read(&buf[..BLOCK_HEADER_SIZE])?;
    if (header.total_len as usize) < BLOCK_HEADER_SIZE {
        return Err(BlockError::CorruptPayload {
            offset,
            detail: format!("block length {} is smaller than its header", header.total_len),
        });
    }
    if buf.len() < header.total_len as usize {
        return Err(BlockError::Truncated {
            offset,
            expected: header.total_len as u64,
            actual: buf.len() as u64,
        });
    }
    let body = header.total_len as u64 - BLOCK_HEADER_SIZE as u64;
    if header.payload_len as u64 > body {
        return Err(BlockError::CorruptPayload {
            offset,
            detail: format!(
                "payload length {} exceeds the {} bytes after the header",
                header.payload_len, body
            ),
        });
    }
    let compression = CompressionId::from_id(header.compression).ok_or(
        BlockError::UnknownCompression {
            offset,
            id: header.compression,
        },
    )?;
    let cipher_id = CipherId::from_id(header.cipher).ok_or(BlockError::UnknownCipher {
        offset,
        id: header.cipher,
    })?;

    let payload_end = BLOCK_HEADER_SIZE + header.payload_len as usize;
    let decrypted = cipher
        .decrypt_as(cipher_id, &buf[BLOCK_HEADER_SIZE..payload_end])
        .map_err(|e| BlockError::CorruptPayload {
            offset,
            detail: e.to_string(),
        })?;
    let data = compression
        .decompress(&decrypted)
        .map_err(|e| BlockError::CorruptPayload {
            offset,
            detail: e.to_string(),
        })?;
    let trailer = buf[payload_end..header.total_len as usize].to_vec();

    Ok(DecodedBlock {
        kind: header.kind,
        compression,
        cipher: cipher_id,
        total_len: header.total_len,
        data,
        trailer,
    })
}

/// Seek to `offset` and decode the block found there.
pub fn read_block_at<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    cipher: &mut CipherSuite,
) -> Result<DecodedBlock, BlockError> {
    reader.seek(SeekFrom::Start(offset))?;
    let total_len = match reader.read_u32::<BigEndian>() {
        Ok(len) => len,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(BlockError::Truncated {
                offset,
                expected: BLOCK_HEADER_SIZE as u64,
                actual: remaining(reader, offset)?,
            })
        }
        Err(e) => return Err(e.into()),
    };
    if (total_len as usize) < BLOCK_HEADER_SIZE {
        return Err(BlockError::CorruptPayload {
            offset,
            detail: format!("block length {total_len} is smaller than its header"),
        });
    }
    let mut buf = vec![0u8; total_len as usize];
    buf[..4].copy_from_slice(&total_len.to_be_bytes());
    match reader.read_exact(&mut buf[4..]) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(BlockError::Truncated {
                offset,
                expected: total_len as u64,
                actual: remaining(reader, offset)?,
            })
        }
        Err(e) => return Err(e.into()),
    }
    decode_block(&buf, cipher, offset)
}

fn remaining<R: Seek>(reader: &mut R, offset: u64) -> Result<u64, BlockError> {
    let end = reader.seek(SeekFrom::End(0))?;
    Ok(end.saturating_sub(offset))
}

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Truncated block at offset {offset}: expected {expected} bytes, found {actual}")]
    Truncated {
        offset: u64,
        expected: u64,
        actual: u64,
    },
    #[error("Corrupt block at offset {offset}: {detail}")]
    CorruptPayload { offset: u64, detail: String },
    #[error("Block of {len} bytes does not fit the u32 length prefix")]
    Oversize { len: u64 },
    #[error("Unknown compression id {id} in block at offset {offset}")]
    UnknownCompression { offset: u64, id: u8 },
    #[error("Unknown cipher id {id} in block at offset {offset}")]
    UnknownCipher { offset: u64, id: u8 },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn plain_suite() -> CipherSuite {
        CipherSuite::new(0, None).unwrap()
    }

    #[test]
    fn roundtrip_with_trailer() {
        let compressor = Compressor::new(10, 1);
        let mut suite = plain_suite();
        let data = b"primera pagina del listado".repeat(20);
        let trailer = [0u8, 3, 0, 0, 0, 9];

        let block = encode_block(BlockKind::Pages, &compressor, &mut suite, &data, &trailer).unwrap();
        let decoded = decode_block(&block, &mut suite, 0).unwrap();

        assert_eq!(decoded.kind, BlockKind::Pages as u8);
        assert_eq!(decoded.compression, CompressionId::Zstd);
        assert_eq!(decoded.cipher, CipherId::Plain);
        assert_eq!(decoded.data, data);
        assert_eq!(decoded.trailer, trailer);
        assert_eq!(decoded.total_len as usize, block.len());
    }

    #[test]
    fn stored_block_length_math() {
        let compressor = Compressor::new(0, 1);
        let mut suite = plain_suite();
        let block =
            encode_block(BlockKind::Metadata, &compressor, &mut suite, b"abcdef", b"xyz").unwrap();
        // store + plain keep the payload verbatim
        assert_eq!(block.len(), BLOCK_HEADER_SIZE + 6 + 3);
        let decoded = decode_block(&block, &mut suite, 0).unwrap();
        assert_eq!(decoded.data, b"abcdef");
        assert_eq!(decoded.trailer, b"xyz");
    }

    #[test]
    fn truncated_buffer_is_reported() {
        let compressor = Compressor::new(0, 1);
        let mut suite = plain_suite();
        let block =
            encode_block(BlockKind::Metadata, &compressor, &mut suite, b"contenido", b"").unwrap();

        let err = decode_block(&block[..block.len() - 3], &mut suite, 120).unwrap_err();
        match err {
            BlockError::Truncated { offset, expected, actual } => {
                assert_eq!(offset, 120);
                assert_eq!(expected as usize, block.len());
                assert_eq!(actual as usize, block.len() - 3);
            }
            other => panic!("expected Truncated, got {other:?}"),
        }

        let err = decode_block(&block[..5], &mut suite, 0).unwrap_err();
        assert!(matches!(err, BlockError::Truncated { .. }));
    }

    #[test]
    fn unknown_ids_are_fatal() {
        let compressor = Compressor::new(0, 1);
        let mut suite = plain_suite();
        let mut block =
            encode_block(BlockKind::Pages, &compressor, &mut suite, b"pagina", b"").unwrap();

        block[5] = 7; // retired compression id
        let err = decode_block(&block, &mut suite, 42).unwrap_err();
        assert!(matches!(
            err,
            BlockError::UnknownCompression { offset: 42, id: 7 }
        ));

        block[5] = 0;
        block[6] = 9; // unassigned cipher id
        let err = decode_block(&block, &mut suite, 42).unwrap_err();
        assert!(matches!(err, BlockError::UnknownCipher { offset: 42, id: 9 }));
    }

    #[test]
    fn oversized_payload_length_is_corrupt() {
        let compressor = Compressor::new(0, 1);
        let mut suite = plain_suite();
        let mut block =
            encode_block(BlockKind::Pages, &compressor, &mut suite, b"pagina", b"").unwrap();
        // claim more payload than the block holds
        block[7..11].copy_from_slice(&(1000u32).to_be_bytes());
        let err = decode_block(&block, &mut suite, 0).unwrap_err();
        assert!(matches!(err, BlockError::CorruptPayload { .. }));
    }

    #[test]
    fn four_gib_blocks_are_refused() {
        let (total, payload) = header_lengths(100, 6).unwrap();
        assert_eq!(total, 117);
        assert_eq!(payload, 100);

        let err = header_lengths((u32::MAX as u64 + 1) as usize, 0).unwrap_err();
        assert!(matches!(err, BlockError::Oversize { .. }));

        // the header and trailer count against the same u32 total
        let err = header_lengths((u32::MAX - 20) as usize, 32).unwrap_err();
        match err {
            BlockError::Oversize { len } => assert_eq!(len, u32::MAX as u64 + 23),
            other => panic!("expected Oversize, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_payload_fails_decompression() {
        let compressor = Compressor::new(1, 1);
        let mut suite = plain_suite();
        let data = b"lineas y mas lineas de texto".repeat(10);
        let mut block =
            encode_block(BlockKind::Pages, &compressor, &mut suite, &data, b"").unwrap();
        let mid = BLOCK_HEADER_SIZE + 4;
        block[mid] ^= 0xFF;
        let err = decode_block(&block, &mut suite, 0).unwrap_err();
        assert!(matches!(err, BlockError::CorruptPayload { .. }));
    }

    #[test]
    fn read_blocks_back_to_back() {
        let compressor = Compressor::new(4, 1);
        let mut suite = plain_suite();
        let first =
            encode_block(BlockKind::Metadata, &compressor, &mut suite, b"uno", b"").unwrap();
        let second =
            encode_block(BlockKind::Pages, &compressor, &mut suite, b"dos", b"tt").unwrap();

        let mut stream = Vec::new();
        stream.extend_from_slice(&first);
        stream.extend_from_slice(&second);
        let mut cursor = Cursor::new(stream);

        let a = read_block_at(&mut cursor, 0, &mut suite).unwrap();
        assert_eq!(a.data, b"uno");
        let b = read_block_at(&mut cursor, first.len() as u64, &mut suite).unwrap();
        assert_eq!(b.data, b"dos");
        assert_eq!(b.trailer, b"tt");

        // one byte past the last block there is nothing left to read
        let end = (first.len() + second.len()) as u64;
        let err = read_block_at(&mut cursor, end, &mut suite).unwrap_err();
        assert!(matches!(err, BlockError::Truncated { .. }));
    }

    proptest! {
        #[test]
        fn any_payload_roundtrips_every_algorithm(
            data in proptest::collection::vec(any::<u8>(), 0..2048),
            trailer in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let mut suite = plain_suite();
            for id in [0u8, 1, 3, 4, 9, 10] {
                let compressor = Compressor::new(id, 1);
                let block =
                    encode_block(BlockKind::Pages, &compressor, &mut suite, &data, &trailer)
                        .unwrap();
                let decoded = decode_block(&block, &mut suite, 0).unwrap();
                prop_assert_eq!(&decoded.data, &data);
                prop_assert_eq!(&decoded.trailer, &trailer);
            }
        }
    }
}
