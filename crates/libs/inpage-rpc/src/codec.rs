use std::io::{self, ErrorKind};

use serde::{de::DeserializeOwned, Serialize};

pub fn encode_frame<T: Serialize>(msg: &T) -> io::Result<Vec<u8>> {
    serde_json::to_vec(msg).map_err(|err| io::Error::new(ErrorKind::InvalidData, err))
}

pub fn decode_frame<T: DeserializeOwned>(bytes: &[u8]) -> io::Result<T> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(io::Error::new(ErrorKind::UnexpectedEof, "empty frame"));
    }
    serde_json::from_slice(bytes).map_err(|err| io::Error::new(ErrorKind::InvalidData, err))
}

/// Newline-delimited framing used on stdio host links.
pub fn encode_line<T: Serialize>(msg: &T) -> io::Result<String> {
    let mut line =
        serde_json::to_string(msg).map_err(|err| io::Error::new(ErrorKind::InvalidData, err))?;
    line.push('\n');
    Ok(line)
}

pub fn decode_line<T: DeserializeOwned>(line: &str) -> io::Result<T> {
    decode_frame(line.trim_end_matches(['\r', '\n']).as_bytes())
}
