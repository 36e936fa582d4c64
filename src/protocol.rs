use std::collections::BTreeMap;
use std::fmt;

/// Length of every command code on the wire
pub const CODE_LEN: usize = 3;

/// Longest receive line kept before it is discarded
pub const MAX_LINE: usize = 256;

/// Highest id displayed in the primary group of the standard table
pub const PRIMARY_MAX_ID: u32 = 13;

#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum TableError {
    #[error("invalid command code {0:?}, expected 3 printable ASCII characters")]
    InvalidCode(String),

    #[error("duplicate command id {0}")]
    DuplicateId(u32),

    #[error("duplicate command code {0} (ids {1} and {2})")]
    DuplicateCode(Code, u32, u32),
}

/// Three character ASCII command code
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Code([u8; CODE_LEN]);

impl Code {
    pub fn new(s: &str) -> Result<Self, TableError> {
        let b = s.as_bytes();
        if b.len() != CODE_LEN || !b.iter().all(|c| c.is_ascii_graphic()) {
            return Err(TableError::InvalidCode(s.to_string()));
        }

        let mut code = [0u8; CODE_LEN];
        code.copy_from_slice(b);
        Ok(Self(code))
    }

    pub fn as_bytes(&self) -> &[u8; CODE_LEN] {
        &self.0
    }

    /// Byte-exact comparison against a received line
    pub fn matches(&self, line: &str) -> bool {
        line.as_bytes() == &self.0[..]
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.iter() {
            write!(f, "{}", *c as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code({})", self)
    }
}

impl std::str::FromStr for Code {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Display grouping of a command
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Group {
    Primary,
    Supplementary,
}

#[derive(Clone, PartialEq, Debug)]
pub struct CommandEntry {
    pub id: u32,
    pub description: String,
    pub code: Code,
}

impl CommandEntry {
    pub fn new(id: u32, description: &str, code: &str) -> Result<Self, TableError> {
        Ok(Self {
            id,
            description: description.to_string(),
            code: Code::new(code)?,
        })
    }
}

/// Ordered set of commands available to the operator
#[derive(Clone, PartialEq, Debug)]
pub struct CommandTable {
    entries: BTreeMap<u32, CommandEntry>,
    primary_max_id: u32,
}

const STANDARD: &[(u32, &str, &str)] = &[
    (1, "Enable fuel line", "ATL"),
    (2, "Disable fuel line", "DTL"),
    (3, "Close vent", "FCV"),
    (4, "Enable line purge", "ATP"),
    (5, "Disable line purge", "DTP"),
    (6, "Enable supercharge", "ATS"),
    (7, "Disable supercharge", "DTS"),
    (10, "Enable quick disconnect", "ATQ"),
    (11, "Arm", "ATA"),
    (12, "Enable ignition", "ATI"),
    (13, "Enable injection", "ATJ"),
    (14, "Disarm", "DTA"),
    (15, "Disable injection", "DTJ"),
    (16, "Disable ignition", "DTI"),
    (17, "Open vent", "ABV"),
    (18, "Enable tank purge", "ATT"),
    (19, "Disable tank purge", "DTT"),
    (20, "Disable quick disconnect", "DTQ"),
];

impl CommandTable {
    /// Build a table, rejecting duplicate ids or codes
    pub fn new<I>(entries: I, primary_max_id: u32) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = CommandEntry>,
    {
        let mut map = BTreeMap::new();
        let mut codes: BTreeMap<Code, u32> = BTreeMap::new();

        for e in entries {
            if map.contains_key(&e.id) {
                return Err(TableError::DuplicateId(e.id));
            }
            if let Some(other) = codes.insert(e.code, e.id) {
                return Err(TableError::DuplicateCode(e.code, other, e.id));
            }
            map.insert(e.id, e);
        }

        Ok(Self { entries: map, primary_max_id })
    }

    /// The rig's built-in command set
    pub fn standard() -> Self {
        let entries = STANDARD.iter().map(|(id, d, c)| CommandEntry {
            id: *id,
            description: d.to_string(),
            code: Code(code_bytes(c)),
        });

        let mut map = BTreeMap::new();
        for e in entries {
            map.insert(e.id, e);
        }

        Self { entries: map, primary_max_id: PRIMARY_MAX_ID }
    }

    pub fn get(&self, id: u32) -> Option<&CommandEntry> {
        self.entries.get(&id)
    }

    pub fn find_code(&self, code: &Code) -> Option<&CommandEntry> {
        self.entries.values().find(|e| &e.code == code)
    }

    /// All entries in id order
    pub fn iter(&self) -> impl Iterator<Item = &CommandEntry> {
        self.entries.values()
    }

    pub fn group_of(&self, entry: &CommandEntry) -> Group {
        if entry.id <= self.primary_max_id {
            Group::Primary
        } else {
            Group::Supplementary
        }
    }

    /// Entries displayed under `group`, in id order
    pub fn group(&self, group: Group) -> impl Iterator<Item = &CommandEntry> {
        self.entries.values().filter(move |e| self.group_of(e) == group)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn code_bytes(s: &str) -> [u8; CODE_LEN] {
    let mut code = [0u8; CODE_LEN];
    code.copy_from_slice(&s.as_bytes()[..CODE_LEN]);
    code
}

/// A complete line received from the channel
#[derive(Clone, PartialEq, Debug)]
pub enum Line {
    /// ASCII text with surrounding whitespace removed
    Text(String),
    /// Raw bytes of a line containing non-ASCII data
    Undecodable(Vec<u8>),
}

/// Splits received bytes into lines.
///
/// A line ends at `\n`, or when a partial line has seen no new bytes for the
/// idle period passed to `flush_idle`.
#[derive(Clone, Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    last_rx_ms: u64,
    overflowed: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a byte received at `now_ms`, returning a line if one completed
    pub fn push(&mut self, byte: u8, now_ms: u64) -> Option<Line> {
        self.last_rx_ms = now_ms;

        if byte == b'\n' {
            if self.overflowed {
                debug!("Dropping overlong line");
                self.overflowed = false;
                self.buf.clear();
                return None;
            }
            return Some(self.take());
        }

        if self.buf.len() >= MAX_LINE {
            self.overflowed = true;
            self.buf.clear();
        }
        self.buf.push(byte);

        None
    }

    /// Complete a pending partial line once it has been idle for `idle_ms`
    pub fn flush_idle(&mut self, now_ms: u64, idle_ms: u64) -> Option<Line> {
        if self.buf.is_empty() || now_ms.saturating_sub(self.last_rx_ms) < idle_ms {
            return None;
        }

        if self.overflowed {
            self.overflowed = false;
            self.buf.clear();
            return None;
        }

        Some(self.take())
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn take(&mut self) -> Line {
        let raw = std::mem::take(&mut self.buf);

        if raw.is_ascii() {
            // ASCII is always valid UTF-8
            let s = String::from_utf8_lossy(&raw);
            Line::Text(s.trim().to_string())
        } else {
            Line::Undecodable(raw)
        }
    }
}
