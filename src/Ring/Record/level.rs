use crate::Core::error::LogRingError;
use std::fmt;
use std::str::FromStr;

/// Severity of a diagnostic event, with the numeric codes stored in records.
#[repr(i32)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorLevel {
    Debug5 = 10,
    Debug4 = 11,
    Debug3 = 12,
    Debug2 = 13,
    Debug1 = 14,
    #[default]
    Log = 15,
    LogServerOnly = 16,
    Info = 17,
    Notice = 18,
    Warning = 19,
    Error = 20,
    Fatal = 21,
    Panic = 22,
}

impl ErrorLevel {
    pub const ALL: [ErrorLevel; 13] = [
        ErrorLevel::Debug5,
        ErrorLevel::Debug4,
        ErrorLevel::Debug3,
        ErrorLevel::Debug2,
        ErrorLevel::Debug1,
        ErrorLevel::Log,
        ErrorLevel::LogServerOnly,
        ErrorLevel::Info,
        ErrorLevel::Notice,
        ErrorLevel::Warning,
        ErrorLevel::Error,
        ErrorLevel::Fatal,
        ErrorLevel::Panic,
    ];

    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorLevel::Debug5 => "debug5",
            ErrorLevel::Debug4 => "debug4",
            ErrorLevel::Debug3 => "debug3",
            ErrorLevel::Debug2 => "debug2",
            ErrorLevel::Debug1 => "debug1",
            ErrorLevel::Log => "log",
            ErrorLevel::LogServerOnly => "log_server_only",
            ErrorLevel::Info => "info",
            ErrorLevel::Notice => "notice",
            ErrorLevel::Warning => "warning",
            ErrorLevel::Error => "error",
            ErrorLevel::Fatal => "fatal",
            ErrorLevel::Panic => "panic",
        }
    }
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for ErrorLevel {
    type Err = LogRingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|l| l.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| LogRingError::UnknownLevel(s.to_string()))
    }
}
