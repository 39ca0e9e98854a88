use std::io::{Read, Write};

use bytes::Bytes;
use crc::Crc;
use flate2::{read::GzDecoder, write::GzEncoder, Compression as GzLevel};

use crate::error::{Error, Result};

pub fn to_crc(data: &[u8]) -> u32 {
    Crc::<u32>::new(&crc::CRC_32_ISO_HDLC).checksum(data)
}

pub fn compress(data: &[u8]) -> Result<Bytes> {
    let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
    encoder.write_all(data).map_err(|err| {
        tracing::error!("ERROR: gzip compression failed {:?}", err);
        Error::CompressionError
    })?;
    let compressed = encoder.finish().map_err(|err| {
        tracing::error!("ERROR: gzip compression failed {:?}", err);
        Error::CompressionError
    })?;
    Ok(Bytes::from(compressed))
}

pub fn uncompress(data: &[u8]) -> Result<Bytes> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(|err| {
        tracing::error!("ERROR: gzip decompression failed {:?}", err);
        Error::CompressionError
    })?;
    Ok(Bytes::from(out))
}
