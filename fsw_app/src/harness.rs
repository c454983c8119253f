//! Text command script.
//!
//! One command per line, `#` starts a comment:
//!
//! ```text
//! 0                              # fc with no payload
//! 5 01                           # fc with hex payload
//! load 0 replace tables/a.json   # load table command
//! dump 1 /tmp/params.json        # dump table command
//! compute 50000 42               # compute command (iterations, seed)
//! raw 1880c000000107ff           # raw packet bytes, not re-checksummed
//! wait 20                        # sleep, in milliseconds
//! status                         # log housekeeping status
//! ```

use std::time::Duration;

use fsw_core::msg::CmdPacket;
use fsw_core::table::{DumpTblCmd, LoadTblCmd, LoadType};

use crate::app::{COMPUTE_CC, DUMP_TBL_CC, LOAD_TBL_CC};
use crate::compute::ComputeCmd;
use crate::error::AppError;

/// One parsed script line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Packet(Vec<u8>),
    Wait(Duration),
    Status,
}

/// Parse one line. `Ok(None)` for blank and comment lines.
pub fn parse_line(msg_id: u16, line_no: usize, line: &str) -> Result<Option<Step>, AppError> {
    let err = |reason: String| AppError::Script {
        line: line_no,
        reason,
    };

    let text = line.split('#').next().unwrap_or_default().trim();
    let mut words = text.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();

    let step = match head {
        "status" => Step::Status,
        "wait" => {
            let ms = number::<u64>(&rest, 0, "milliseconds").map_err(err)?;
            Step::Wait(Duration::from_millis(ms))
        }
        "raw" => Step::Packet(decode_hex(&rest.concat()).map_err(err)?),
        "load" => {
            let id = number::<u8>(&rest, 0, "table id").map_err(err)?;
            let load_type = match rest.get(1).copied() {
                Some("replace") => LoadType::Replace,
                Some("update") => LoadType::Update,
                other => return Err(err(format!("unknown load type {other:?}"))),
            };
            let filename = word(&rest, 2, "filename").map_err(err)?;
            let payload = LoadTblCmd {
                id,
                load_type,
                filename: filename.to_owned(),
            }
            .encode()?;
            Step::Packet(CmdPacket::build(msg_id, LOAD_TBL_CC, &payload)?)
        }
        "dump" => {
            let id = number::<u8>(&rest, 0, "table id").map_err(err)?;
            let filename = word(&rest, 1, "filename").map_err(err)?;
            let payload = DumpTblCmd {
                id,
                filename: filename.to_owned(),
            }
            .encode()?;
            Step::Packet(CmdPacket::build(msg_id, DUMP_TBL_CC, &payload)?)
        }
        "compute" => {
            let cmd = ComputeCmd {
                iterations: number(&rest, 0, "iterations").map_err(err)?,
                seed: number(&rest, 1, "seed").map_err(err)?,
            };
            Step::Packet(CmdPacket::build(msg_id, COMPUTE_CC, &cmd.encode())?)
        }
        fc => {
            let fc: u16 = fc
                .parse()
                .map_err(|_| err(format!("unknown command '{fc}'")))?;
            let payload = decode_hex(&rest.concat()).map_err(err)?;
            Step::Packet(CmdPacket::build(msg_id, fc, &payload)?)
        }
    };
    Ok(Some(step))
}

/// Parse a whole script, stopping at the first bad line.
pub fn parse_script(msg_id: u16, text: &str) -> Result<Vec<Step>, AppError> {
    text.lines()
        .enumerate()
        .filter_map(|(i, line)| parse_line(msg_id, i + 1, line).transpose())
        .collect()
}

fn word<'a>(words: &[&'a str], index: usize, what: &str) -> Result<&'a str, String> {
    words
        .get(index)
        .copied()
        .ok_or_else(|| format!("missing {what}"))
}

fn number<T: std::str::FromStr>(words: &[&str], index: usize, what: &str) -> Result<T, String> {
    let text = word(words, index, what)?;
    text.parse()
        .map_err(|_| format!("invalid {what} '{text}'"))
}

fn decode_hex(text: &str) -> Result<Vec<u8>, String> {
    if text.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{text}'"));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("invalid hex '{text}'"))
        })
        .collect()
}
