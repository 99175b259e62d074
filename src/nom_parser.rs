use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::bytes::streaming;
use nom::character::complete::char;
use nom::combinator::{all_consuming, map, map_res, rest, value, verify};
use nom::sequence::{preceded, separated_pair, terminated};
use nom::IResult;

use crate::message::{Answer, ParseError, ResponseMessage, ResponseTag, SniffFrame};
use crate::types::Version;

type Buf = [u8];

const LF: &Buf = b"\n";

/// Find the first complete line in `buf`.
///
/// Returns the number of bytes consumed including the terminator, and the line
/// without its `\n` or `\r\n` terminator. `(0, None)` means more data is needed.
pub(crate) fn next_line(buf: &Buf) -> (usize, Option<&Buf>) {
    match line(buf) {
        Ok((remaining, line)) => {
            let line = match line.split_last() {
                Some((b'\r', head)) => head,
                _ => line,
            };
            (buf.len() - remaining.len(), Some(line))
        }
        Err(_) => (0, None),
    }
}

fn line(buf: &Buf) -> IResult<&Buf, &Buf> {
    terminated(streaming::take_until(LF), streaming::tag(LF))(buf)
}

/// Decode one inbound adapter line.
pub(crate) fn parse_response(line: &str) -> Result<ResponseMessage, ParseError> {
    match all_consuming(response)(line) {
        Ok((_, message)) => Ok(message),
        Err(_) => {
            let tag = line.split(',').next().unwrap_or_default();
            let known = tag.len() == 1 && tag.chars().next().and_then(ResponseTag::from_char).is_some();
            if known {
                Err(ParseError::Malformed {
                    line: line.to_string(),
                })
            } else {
                Err(ParseError::UnknownTag {
                    tag: tag.to_string(),
                })
            }
        }
    }
}

fn response(line: &str) -> IResult<&str, ResponseMessage> {
    alt((
        map(
            preceded(tag("v,"), separated_pair(version, char(','), rest)),
            |(version, cpu_id): (Version, &str)| ResponseMessage::SoftwareVersion {
                version,
                cpu_id: cpu_id.to_string(),
            },
        ),
        map(
            preceded(tag("h,"), separated_pair(version, char(','), rest)),
            |(version, capabilities): (Version, &str)| ResponseMessage::HardwareVersion {
                version,
                capabilities: capabilities.to_string(),
            },
        ),
        map(preceded(tag("f,"), terminated(ack_nack, rest)), |success| {
            ResponseMessage::Configuration { success }
        }),
        map(preceded(tag("l,"), terminated(ack_nack, rest)), |success| {
            ResponseMessage::Relay { success }
        }),
        map(preceded(tag("x,"), sniff), ResponseMessage::Sniff),
        map(preceded(tag("c,"), fields), |fields| {
            ResponseMessage::CashlessSlave { fields }
        }),
        map(preceded(tag("d,"), fields), |fields| {
            ResponseMessage::CashlessMaster { fields }
        }),
        map(preceded(tag("m,"), ack_nack), |success| {
            ResponseMessage::GenericMaster { success }
        }),
        map(preceded(tag("p,"), answer), ResponseMessage::CommandGroup),
    ))(line)
}

fn version(s: &str) -> IResult<&str, Version> {
    map_res(take_while1(|c: char| c.is_ascii_digit() || c == '.'), str::parse::<Version>)(s)
}

fn ack_nack(s: &str) -> IResult<&str, bool> {
    alt((value(true, tag("ACK")), value(false, tag("NACK"))))(s)
}

fn answer(s: &str) -> IResult<&str, Answer> {
    alt((
        value(Answer::Ack, tag("ACK")),
        value(Answer::Nack, tag("NACK")),
        map(hex_bytes, Answer::Data),
    ))(s)
}

fn sniff(s: &str) -> IResult<&str, SniffFrame> {
    alt((
        value(SniffFrame::Ack, all_consuming(tag("ACK"))),
        map(fields, SniffFrame::Frame),
    ))(s)
}

fn fields(s: &str) -> IResult<&str, Vec<String>> {
    map(rest, |s: &str| s.split(',').map(str::to_string).collect())(s)
}

fn hex_bytes(s: &str) -> IResult<&str, Vec<u8>> {
    map_res(
        verify(take_while1(|c: char| c.is_ascii_hexdigit()), |h: &str| {
            h.len() % 2 == 0
        }),
        decode_hex,
    )(s)
}

fn decode_hex(s: &str) -> Result<Vec<u8>, core::num::ParseIntError> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_line() {
        assert_eq!(next_line(b"p,ACK"), (0, None));
        assert_eq!(next_line(b"p,ACK\r\nm,"), (7, Some(&b"p,ACK"[..])));
        assert_eq!(next_line(b"p,ACK\nm,"), (6, Some(&b"p,ACK"[..])));
        assert_eq!(next_line(b"\r\n"), (2, Some(&b""[..])));
    }

    #[test]
    fn test_versions() {
        assert_eq!(
            parse_response("v,4.1.0.23,0123456789AB"),
            Ok(ResponseMessage::SoftwareVersion {
                version: Version::new(4, 1, 0, 23),
                cpu_id: "0123456789AB".to_string(),
            })
        );
        assert_eq!(
            parse_response("h,1.0,MASTER,SLAVE"),
            Ok(ResponseMessage::HardwareVersion {
                version: Version::new(1, 0, 0, 0),
                capabilities: "MASTER,SLAVE".to_string(),
            })
        );
    }

    #[test]
    fn test_command_group_answers() {
        use ResponseMessage::CommandGroup;
        assert_eq!(parse_response("p,ACK"), Ok(CommandGroup(Answer::Ack)));
        assert_eq!(parse_response("p,NACK"), Ok(CommandGroup(Answer::Nack)));
        assert_eq!(
            parse_response("p,06"),
            Ok(CommandGroup(Answer::Data(vec![0x06])))
        );
        assert_eq!(
            parse_response("p,AC0d"),
            Ok(CommandGroup(Answer::Data(vec![0xAC, 0x0D])))
        );
        assert!(matches!(
            parse_response("p,ACKX"),
            Err(ParseError::Malformed { .. })
        ));
        assert!(matches!(
            parse_response("p,123"),
            Err(ParseError::Malformed { .. })
        ));
    }

    #[test]
    fn test_other_tags() {
        assert_eq!(
            parse_response("m,ACK"),
            Ok(ResponseMessage::GenericMaster { success: true })
        );
        assert_eq!(
            parse_response("f,NACK"),
            Ok(ResponseMessage::Configuration { success: false })
        );
        assert_eq!(
            parse_response("l,ACK"),
            Ok(ResponseMessage::Relay { success: true })
        );
        assert_eq!(
            parse_response("x,ACK"),
            Ok(ResponseMessage::Sniff(SniffFrame::Ack))
        );
        assert_eq!(
            parse_response("x,33,M,1234,56"),
            Ok(ResponseMessage::Sniff(SniffFrame::Frame(vec![
                "33".to_string(),
                "M".to_string(),
                "1234".to_string(),
                "56".to_string()
            ])))
        );
        assert_eq!(
            parse_response("d,STATUS,IDLE"),
            Ok(ResponseMessage::CashlessMaster {
                fields: vec!["STATUS".to_string(), "IDLE".to_string()]
            })
        );
    }

    #[test]
    fn test_unknown_tag() {
        assert_eq!(
            parse_response("q,ACK"),
            Err(ParseError::UnknownTag {
                tag: "q".to_string()
            })
        );
        assert_eq!(
            parse_response("m,MAYBE"),
            Err(ParseError::Malformed {
                line: "m,MAYBE".to_string()
            })
        );
    }
}
