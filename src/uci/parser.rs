//! Parser for lines emitted by a UCI engine.
//!
//! Classification dispatches on the first whitespace-delimited token. `info`
//! lines are re-lexed into identifier, integer, and single-character tokens
//! so that `score cp -42` yields the sign separately from the magnitude.

use std::str::FromStr;

use crate::uci::UciError;
use crate::{BestMove, EngineOption, Info};

/// Keywords that delimit values inside an `option` line.
const OPTION_KEYWORDS: [&str; 6] = ["name", "type", "default", "min", "max", "var"];

/// A classified line of engine output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciMessage {
    /// `id name <...>` or `id author <...>`; other fields pass through for
    /// the caller to ignore.
    Id { field: String, value: String },
    Option(EngineOption),
    UciOk,
    ReadyOk,
    BestMove(BestMove),
    Info(Info),
}

/// Parse one line of engine output.
///
/// Lines that are not part of the protocol yield [`UciError::UnknownMessage`];
/// callers are expected to skip those, keeping the session tolerant of engine
/// chatter.
pub fn parse_uci_message(line: &str) -> Result<UciMessage, UciError> {
    let fields: Vec<&str> = line.split_whitespace().collect();

    match fields.first() {
        Some(&"id") => {
            if fields.len() < 3 {
                return Err(UciError::MalformedMessage(line.to_string()));
            }
            Ok(UciMessage::Id {
                field: fields[1].to_string(),
                value: fields[2..].join(" "),
            })
        }
        Some(&"option") => Ok(UciMessage::Option(parse_option(&fields[1..]))),
        Some(&"uciok") => Ok(UciMessage::UciOk),
        Some(&"readyok") => Ok(UciMessage::ReadyOk),
        Some(&"bestmove") => {
            if fields.len() < 2 {
                return Err(UciError::MalformedMessage(line.to_string()));
            }
            let ponder = if fields.len() >= 4 && fields[2] == "ponder" {
                fields[3].to_string()
            } else {
                String::new()
            };
            Ok(UciMessage::BestMove(BestMove {
                bestmove: fields[1].to_string(),
                ponder,
            }))
        }
        Some(&"info") => Ok(UciMessage::Info(parse_info(line)?)),
        _ => Err(UciError::UnknownMessage(line.to_string())),
    }
}

/// Collect the value run following an option keyword: every field up to the
/// next reserved keyword or end of line, joined by single spaces. The literal
/// `<empty>` stands for the empty string.
fn option_value(fields: &[&str]) -> (String, usize) {
    let end = fields
        .iter()
        .position(|f| OPTION_KEYWORDS.contains(f))
        .unwrap_or(fields.len());

    let mut value = fields[..end].join(" ");
    if value == "<empty>" {
        value.clear();
    }
    (value, end)
}

/// Parse the body of an `option` line (everything after the `option` token).
pub(crate) fn parse_option(fields: &[&str]) -> EngineOption {
    let mut opt = EngineOption::default();

    let mut i = 0;
    while i < fields.len() {
        match fields[i] {
            "name" => {
                let (value, skip) = option_value(&fields[i + 1..]);
                opt.name = value;
                i += skip;
            }
            "type" => {
                let (value, skip) = option_value(&fields[i + 1..]);
                opt.kind = value;
                i += skip;
            }
            "default" => {
                let (value, skip) = option_value(&fields[i + 1..]);
                opt.default = value;
                i += skip;
            }
            "min" => {
                let (value, skip) = option_value(&fields[i + 1..]);
                opt.min = value;
                i += skip;
            }
            "max" => {
                let (value, skip) = option_value(&fields[i + 1..]);
                opt.max = value;
                i += skip;
            }
            "var" => {
                let (value, skip) = option_value(&fields[i + 1..]);
                opt.var.push(value);
                i += skip;
            }
            _ => {}
        }
        i += 1;
    }
    opt
}

/// Lex an `info` line into identifier, integer literal, and single-character
/// tokens. `-42` lexes as `-` followed by `42`; move strings like `e2e4` are
/// single identifier tokens.
fn lex(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        let mut end = start + c.len_utf8();
        if c.is_ascii_alphabetic() || c == '_' {
            while let Some(&(j, d)) = chars.peek() {
                if !d.is_ascii_alphanumeric() && d != '_' {
                    break;
                }
                chars.next();
                end = j + d.len_utf8();
            }
        } else if c.is_ascii_digit() {
            while let Some(&(j, d)) = chars.peek() {
                if !d.is_ascii_digit() {
                    break;
                }
                chars.next();
                end = j + d.len_utf8();
            }
        }
        tokens.push(&line[start..end]);
    }
    tokens
}

/// Consume the integer following a numeric info keyword.
fn next_int<T>(tokens: &[&str], i: &mut usize, line: &str) -> Result<T, UciError>
where
    T: FromStr,
{
    *i += 1;
    let tok = tokens
        .get(*i)
        .ok_or_else(|| UciError::MalformedMessage(line.to_string()))?;
    tok.parse()
        .map_err(|_| UciError::MalformedMessage(line.to_string()))
}

/// Parse an `info` line into an [`Info`] snapshot.
///
/// Unknown keywords are skipped. A numeric field that fails to parse abandons
/// the whole line, so no partial snapshot reaches the caller.
pub(crate) fn parse_info(line: &str) -> Result<Info, UciError> {
    let tokens = lex(line);
    let mut info = Info::default();
    let mut string_parts: Vec<&str> = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            "depth" => info.depth = next_int(&tokens, &mut i, line)?,
            "seldepth" => info.seldepth = next_int(&tokens, &mut i, line)?,
            "time" => info.time_ms = next_int(&tokens, &mut i, line)?,
            "nodes" => info.nodes = next_int(&tokens, &mut i, line)?,
            "nps" => info.nps = next_int(&tokens, &mut i, line)?,
            "multipv" => info.multipv = next_int(&tokens, &mut i, line)?,
            "currmovenumber" => info.currmovenumber = next_int(&tokens, &mut i, line)?,
            "hashfull" => info.hashfull = next_int(&tokens, &mut i, line)?,
            "tbhits" => info.tbhits = next_int(&tokens, &mut i, line)?,
            "sbhits" => info.sbhits = next_int(&tokens, &mut i, line)?,
            "cpuload" => info.cpuload = next_int(&tokens, &mut i, line)?,
            "currmove" => {
                i += 1;
                if let Some(tok) = tokens.get(i) {
                    info.currmove = tok.to_string();
                }
            }
            "score" => {
                i += 1;
                match tokens.get(i).copied() {
                    Some("cp") => i += 1,
                    Some("mate") => {
                        info.score.mate = true;
                        i += 1;
                    }
                    _ => {}
                }
                let mut neg = false;
                if tokens.get(i).copied() == Some("-") {
                    neg = true;
                    i += 1;
                }
                let tok = tokens
                    .get(i)
                    .ok_or_else(|| UciError::MalformedMessage(line.to_string()))?;
                let value: i32 = tok
                    .parse()
                    .map_err(|_| UciError::MalformedMessage(line.to_string()))?;
                info.score.value = if neg { -value } else { value };
            }
            "lowerbound" => info.score.lowerbound = true,
            "upperbound" => info.score.upperbound = true,
            // The trailing forms own the rest of the line.
            "pv" => {
                for tok in &tokens[i + 1..] {
                    info.pv.push(tok.to_string());
                }
                break;
            }
            "refutation" => {
                for tok in &tokens[i + 1..] {
                    info.refutation.push(tok.to_string());
                }
                break;
            }
            "currline" => {
                for tok in &tokens[i + 1..] {
                    info.currline.push(tok.to_string());
                }
                break;
            }
            "string" => {
                string_parts.extend(&tokens[i + 1..]);
                break;
            }
            _ => {}
        }
        i += 1;
    }

    info.string = string_parts.join(" ");
    Ok(info)
}
