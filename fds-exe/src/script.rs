//! Register-write scripts.
//!
//! One command per line, `#` starts a comment and numbers are decimal or
//! `0x` hex:
//!
//! ```text
//! w <time> <addr> <value>   # write at <time> cycles into the frame
//! f <time>                  # end the frame after <time> cycles
//! ```

use std::{error::Error, fmt::Display};

use fds_emulator::{check_write, CpuAddr, CpuTime, WriteError};
use sound_traits::SoundChip;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Write {
    pub time: CpuTime,
    pub addr: CpuAddr,
    pub data: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub writes: Vec<Write>,
    /// Length of the frame in CPU cycles
    pub length: CpuTime,
}

impl Frame {
    /// Apply the frame's writes and end it
    pub fn play<C: SoundChip>(&self, chip: &mut C) {
        for w in &self.writes {
            chip.write_register(w.time, w.addr, w.data);
        }
        chip.end_frame(self.length);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    UnknownCommand(String),
    MissingField(&'static str),
    TrailingField(String),
    BadNumber(String),
    ValueOutOfRange(i64),
    AddressOutOfRange(i64),
    NegativeTime(i64),
    TimeBackwards { time: CpuTime, previous: CpuTime },
    Rejected(WriteError),
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::UnknownCommand(cmd) => write!(f, "unknown command {cmd:?}"),
            ErrorKind::MissingField(field) => write!(f, "missing {field}"),
            ErrorKind::TrailingField(field) => write!(f, "unexpected {field:?}"),
            ErrorKind::BadNumber(text) => write!(f, "{text:?} is not a number"),
            ErrorKind::ValueOutOfRange(value) => write!(f, "value {value} is not a byte"),
            ErrorKind::AddressOutOfRange(addr) => write!(f, "address {addr} is out of range"),
            ErrorKind::NegativeTime(time) => write!(f, "time {time} is negative"),
            ErrorKind::TimeBackwards { time, previous } => {
                write!(f, "time {time} is before {previous} in the same frame")
            }
            ErrorKind::Rejected(e) => e.fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    /// 1-based line number
    pub line: usize,
    pub kind: ErrorKind,
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

impl Error for ScriptError {}

fn parse_number(text: &str) -> Result<i64, ErrorKind> {
    let parsed = match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| ErrorKind::BadNumber(text.to_owned()))
}

fn next_number<'a>(
    fields: &mut impl Iterator<Item = &'a str>,
    name: &'static str,
) -> Result<i64, ErrorKind> {
    parse_number(fields.next().ok_or(ErrorKind::MissingField(name))?)
}

fn parse_time<'a>(fields: &mut impl Iterator<Item = &'a str>) -> Result<CpuTime, ErrorKind> {
    let time = next_number(fields, "time")?;
    if time < 0 {
        return Err(ErrorKind::NegativeTime(time));
    }
    Ok(time)
}

impl Script {
    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let mut script = Script::default();
        let mut frame = Frame::default();

        for (index, line) in text.lines().enumerate() {
            let err = |kind: ErrorKind| ScriptError {
                line: index + 1,
                kind,
            };
            let line = line.split('#').next().unwrap_or_default();
            let mut fields = line.split_whitespace();
            let Some(cmd) = fields.next() else {
                continue;
            };
            let previous = frame.writes.last().map_or(0, |w| w.time);

            match cmd {
                "w" => {
                    let time = parse_time(&mut fields).map_err(err)?;
                    let addr = next_number(&mut fields, "address").map_err(err)?;
                    let value = next_number(&mut fields, "value").map_err(err)?;
                    let data =
                        u8::try_from(value).map_err(|_| err(ErrorKind::ValueOutOfRange(value)))?;
                    let addr = CpuAddr::try_from(addr)
                        .map_err(|_| err(ErrorKind::AddressOutOfRange(addr)))?;
                    check_write(addr, data).map_err(|e| err(ErrorKind::Rejected(e)))?;
                    if time < previous {
                        return Err(err(ErrorKind::TimeBackwards { time, previous }));
                    }
                    frame.writes.push(Write { time, addr, data });
                }
                "f" => {
                    let time = parse_time(&mut fields).map_err(err)?;
                    if time < previous {
                        return Err(err(ErrorKind::TimeBackwards { time, previous }));
                    }
                    frame.length = time;
                    script.frames.push(std::mem::take(&mut frame));
                }
                other => return Err(err(ErrorKind::UnknownCommand(other.to_owned()))),
            }

            if let Some(extra) = fields.next() {
                return Err(err(ErrorKind::TrailingField(extra.to_owned())));
            }
        }

        if let Some(last) = frame.writes.last() {
            frame.length = last.time;
            script.frames.push(frame);
        }
        Ok(script)
    }

    pub fn play<C: SoundChip>(&self, chip: &mut C) {
        for frame in &self.frames {
            frame.play(chip);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fds_emulator::Fds;
    use sound_traits::DeltaLog;

    #[test]
    fn parses_frames() {
        let script = Script::parse(
            "# square wave\n\
             w 0 0x4089 0x80\n\
             w 0 0x4040 63   # first sample\n\
             \n\
             f 29780\n\
             w 10 0x4083 0x01\n\
             f 0x7454\n",
        )
        .unwrap();

        assert_eq!(script.frames.len(), 2);
        assert_eq!(script.frames[0].length, 29780);
        assert_eq!(
            script.frames[0].writes[1],
            Write {
                time: 0,
                addr: 0x4040,
                data: 63
            }
        );
        assert_eq!(script.frames[1].length, 0x7454);
        assert_eq!(script.frames[1].writes.len(), 1);
    }

    #[test]
    fn trailing_writes_close_a_frame() {
        let script = Script::parse("w 5 0x4082 1\nw 9 0x4083 1\n").unwrap();
        assert_eq!(script.frames.len(), 1);
        assert_eq!(script.frames[0].length, 9);

        assert_eq!(Script::parse("# nothing\n").unwrap(), Script::default());
    }

    #[test]
    fn reports_line_numbers() {
        let e = Script::parse("w 0 0x4082 1\n\nq 1\n").unwrap_err();
        assert_eq!(e.line, 3);
        assert_eq!(e.kind, ErrorKind::UnknownCommand("q".into()));
        assert_eq!(e.to_string(), "line 3: unknown command \"q\"");
    }

    #[test]
    fn rejects_bad_writes() {
        let kind = |text: &str| Script::parse(text).unwrap_err().kind;
        assert_eq!(kind("w 0 0x4082 256"), ErrorKind::ValueOutOfRange(256));
        assert_eq!(kind("w 0 0x4082"), ErrorKind::MissingField("value"));
        assert_eq!(kind("w 0 zz 1"), ErrorKind::BadNumber("zz".into()));
        assert_eq!(kind("w -1 0x4082 1"), ErrorKind::NegativeTime(-1));
        assert_eq!(kind("w 0 -5 1"), ErrorKind::AddressOutOfRange(-5));
        assert_eq!(kind("w 0 0x4082 1 2"), ErrorKind::TrailingField("2".into()));
        assert_eq!(
            kind("w 0 0x4000 1"),
            ErrorKind::Rejected(WriteError::AddressOutOfRange(0x4000))
        );
        assert_eq!(
            kind("w 0 0x4080 0x20"),
            ErrorKind::Rejected(WriteError::VolumeEnvelope(0x20))
        );
        assert_eq!(
            kind("w 0 0x4089 0x02"),
            ErrorKind::Rejected(WriteError::MasterVolume(0x02))
        );
    }

    #[test]
    fn rejects_time_going_backwards() {
        let e = Script::parse("w 100 0x4082 1\nw 50 0x4082 2\n").unwrap_err();
        assert_eq!(
            e.kind,
            ErrorKind::TimeBackwards {
                time: 50,
                previous: 100
            }
        );
        assert!(Script::parse("w 100 0x4082 1\nf 99\n").is_err());
        // A new frame starts the clock again
        assert!(Script::parse("w 100 0x4082 1\nf 100\nw 0 0x4082 1\n").is_ok());
    }

    #[test]
    fn plays_into_chip() {
        // Flat wave at full level, so only the halt can move the output
        let mut text = String::from("w 0 0x4089 0x80\n");
        for addr in 0x4040..0x4080 {
            text.push_str(&format!("w 0 0x{addr:04X} 0x3F\n"));
        }
        text.push_str(
            "w 0 0x4089 0x00\n\
             w 0 0x4083 0x01\n\
             f 1000\n\
             w 0 0x4083 0x81\n\
             f 1000\n",
        );
        let script = Script::parse(&text).unwrap();
        let mut fds = Fds::with_output(DeltaLog::new());
        script.play(&mut fds);

        let log = fds.output().unwrap();
        assert_eq!(log.events(), &[(0, 31 * 32), (0, -31 * 32)]);
        assert_eq!(fds.last_time(), 0);
    }
}
