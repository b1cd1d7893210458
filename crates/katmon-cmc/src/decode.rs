//! Payload decoders for the CMC and array informs that carry structure.

use katmon_katcp::Message;
use serde::Serialize;

use crate::error::{CmcError, CmcResult};

/// An array as announced by `#array-list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArraySpec {
    pub name: String,
    pub control_port: u16,
    pub monitor_port: u16,
    pub antenna_count: usize,
}

/// Decode `#array-list <name> <ctrl>,<monitor>,<group>,<group>,...`.
///
/// The antenna count is half the number of multicast groups. A monitor port
/// given as the leading token of the next argument is accepted too.
pub fn parse_array_list(message: &Message) -> CmcResult<ArraySpec> {
    let malformed = |reason: &str| CmcError::MalformedInform(format!("{reason}: {message}"));

    let name = message
        .arg(1)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| malformed("missing array name"))?;
    let endpoints = message.arg(2).ok_or_else(|| malformed("missing ports"))?;

    let mut tokens = endpoints.split(',').filter(|t| !t.is_empty()).peekable();
    let control_port = tokens
        .next()
        .and_then(|t| t.parse::<u16>().ok())
        .ok_or_else(|| malformed("bad control port"))?;

    let monitor_port = match tokens.peek().and_then(|t| t.parse::<u16>().ok()) {
        Some(port) => {
            tokens.next();
            port
        }
        None => message
            .arg(3)
            .and_then(|next| next.split(',').next())
            .and_then(|t| t.parse::<u16>().ok())
            .ok_or_else(|| malformed("bad monitor port"))?,
    };

    Ok(ArraySpec {
        name: name.to_string(),
        control_port,
        monitor_port,
        antenna_count: tokens.count() / 2,
    })
}

/// Width of one `hostname-functional-mapping` record.
const MAPPING_RECORD_LEN: usize = 30;
const SERIAL_OFFSET: usize = 8;
const SERIAL_LEN: usize = 6;
const TEAM_OFFSET: usize = 21;
const INDEX_OFFSET: usize = 26;

/// One record of the `hostname-functional-mapping` blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMapping {
    pub team: char,
    pub index: usize,
    pub serial: String,
}

/// Decode `records` fixed-width records from the mapping payload.
///
/// Each record yields its own result so one bad record does not hide the
/// others.
pub fn decode_hostname_mapping(payload: &str, records: usize) -> Vec<CmcResult<HostMapping>> {
    (0..records)
        .map(|i| decode_mapping_record(payload, i * MAPPING_RECORD_LEN))
        .collect()
}

fn decode_mapping_record(payload: &str, base: usize) -> CmcResult<HostMapping> {
    let field = |offset: usize, len: usize| {
        payload
            .get(base + offset..base + offset + len)
            .ok_or_else(|| {
                CmcError::MalformedInform(format!(
                    "hostname mapping truncated at byte {}",
                    base + offset
                ))
            })
    };

    let serial = field(SERIAL_OFFSET, SERIAL_LEN)?;
    let team = field(TEAM_OFFSET, 1)?
        .chars()
        .next()
        .filter(char::is_ascii_alphabetic)
        .ok_or_else(|| CmcError::MalformedInform(format!("bad host type at byte {base}")))?;
    let digits = field(INDEX_OFFSET, 2)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CmcError::MalformedInform(format!(
            "bad host number {digits:?} at byte {base}"
        )));
    }
    let index = digits
        .parse()
        .map_err(|_| CmcError::MalformedInform(format!("bad host number {digits:?}")))?;

    Ok(HostMapping {
        team,
        index,
        serial: serial.to_string(),
    })
}

/// One `(label, input_index, ...)` tuple of the `input-labelling` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputLabel {
    pub label: String,
    pub input_index: usize,
}

impl InputLabel {
    /// F-host fed by this input: only even inputs name a host.
    pub fn f_host_index(&self) -> Option<usize> {
        (self.input_index % 2 == 0).then_some(self.input_index / 2)
    }
}

/// Parse `[('m000h', 0, 'skarab020304-01', 0), ('m000v', 1, ...), ...]`.
pub fn parse_input_labelling(value: &str) -> Vec<CmcResult<InputLabel>> {
    let mut labels = Vec::new();
    let mut rest = value;
    while let Some(open) = rest.find('(') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(')') else {
            labels.push(Err(CmcError::MalformedInform(format!(
                "unterminated input-labelling tuple {after:?}"
            ))));
            break;
        };
        labels.push(parse_label_tuple(&after[..close]));
        rest = &after[close + 1..];
    }
    labels
}

fn parse_label_tuple(tuple: &str) -> CmcResult<InputLabel> {
    let malformed = || CmcError::MalformedInform(format!("bad input-labelling tuple ({tuple})"));
    let mut fields = tuple.split(',').map(|f| f.trim().trim_matches(|c: char| c == '\'' || c == '"'));

    let label = fields.next().filter(|l| !l.is_empty()).ok_or_else(malformed)?;
    let input_index = fields
        .next()
        .and_then(|i| i.parse().ok())
        .ok_or_else(malformed)?;

    Ok(InputLabel {
        label: label.to_string(),
        input_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use katmon_katcp::MessageKind;

    fn array_list(args: &[&str]) -> Message {
        Message::with_words(MessageKind::Inform, "array-list", args)
    }

    fn groups(n: usize) -> String {
        (0..n)
            .map(|i| format!("239.10.{}.{}", i / 256, i % 256))
            .collect::<Vec<_>>()
            .join(",")
    }

    #[test]
    fn test_antenna_count_is_half_the_groups() {
        for k in [0, 1, 2, 8, 32] {
            let msg = array_list(&["array0", &format!("7148,7149,{}", groups(2 * k))]);
            let spec = parse_array_list(&msg).unwrap();
            assert_eq!(spec.antenna_count, k);
            assert_eq!(spec.control_port, 7148);
            assert_eq!(spec.monitor_port, 7149);
        }
    }

    #[test]
    fn test_odd_group_count_truncates() {
        let msg = array_list(&["array0", &format!("7148,7149,{}", groups(5))]);
        assert_eq!(parse_array_list(&msg).unwrap().antenna_count, 2);
    }

    #[test]
    fn test_monitor_port_in_next_argument() {
        let msg = array_list(&["array0", &format!("7148,{}", groups(4)), "7149"]);
        let spec = parse_array_list(&msg).unwrap();
        assert_eq!(spec.monitor_port, 7149);
        assert_eq!(spec.antenna_count, 2);
    }

    #[test]
    fn test_malformed_array_list() {
        assert!(parse_array_list(&array_list(&[])).is_err());
        assert!(parse_array_list(&array_list(&["array0"])).is_err());
        assert!(parse_array_list(&array_list(&["array0", "ctrl,7149"])).is_err());
        assert!(parse_array_list(&array_list(&["array0", "7148"])).is_err());
    }

    fn mapping_record(serial: &str, team: char, index: usize) -> String {
        // serial at 8, team at 21, number at 26
        let record = format!("host-map{serial}-------{team}host{index:02}--");
        assert_eq!(record.len(), MAPPING_RECORD_LEN);
        record
    }

    #[test]
    fn test_decode_hostname_mapping() {
        let payload = format!(
            "{}{}",
            mapping_record("020304", 'f', 0),
            mapping_record("0a0b0c", 'x', 1)
        );
        let decoded: Vec<HostMapping> = decode_hostname_mapping(&payload, 2)
            .into_iter()
            .collect::<CmcResult<_>>()
            .unwrap();
        assert_eq!(
            decoded,
            [
                HostMapping {
                    team: 'f',
                    index: 0,
                    serial: "020304".to_string()
                },
                HostMapping {
                    team: 'x',
                    index: 1,
                    serial: "0a0b0c".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_truncated_mapping_fails_per_record() {
        let payload = mapping_record("020304", 'f', 3);
        let decoded = decode_hostname_mapping(&payload, 2);
        assert!(decoded[0].is_ok());
        assert!(decoded[1].is_err());
    }

    #[test]
    fn test_parse_input_labelling() {
        let value = "[('m000h', 0, 'skarab020304-01', 0), ('m000v', 1, 'skarab020304-01', 1), \
                     ('m001h', 2, 'skarab020305-01', 0), ('m001v', 3, 'skarab020305-01', 1)]";
        let labels: Vec<InputLabel> = parse_input_labelling(value)
            .into_iter()
            .collect::<CmcResult<_>>()
            .unwrap();
        assert_eq!(labels.len(), 4);
        assert_eq!(labels[2].label, "m001h");
        assert_eq!(labels[2].f_host_index(), Some(1));
        assert_eq!(labels[1].f_host_index(), None);
    }

    #[test]
    fn test_bad_label_tuples_are_reported() {
        let labels = parse_input_labelling("[('m000h', zero), ('m000v', 1), ('m001h'");
        assert!(labels[0].is_err());
        assert!(labels[1].is_ok());
        assert!(labels[2].is_err());
    }
}
