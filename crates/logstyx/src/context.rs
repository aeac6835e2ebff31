//! Key/value context merged into every outgoing payload.

use crate::Record;

/// Client-wide context.
///
/// Each mutation bumps `version`, so a payload can tell which generation of
/// the context it was built from. Sends read the context at send time, which
/// means retried entries pick up changes made after they were queued.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SharedContext {
    values: Record,
    version: u64,
}

impl SharedContext {
    /// Context seeded with the application identity, when there is one.
    #[must_use]
    pub fn with_appid(appid: Option<&str>) -> Self {
        let mut values = Record::new();
        if let Some(appid) = appid {
            values.insert("appid".to_string(), appid.into());
        }
        Self { values, version: 0 }
    }

    /// Shallow merge: keys in `partial` overwrite or extend the context.
    pub fn set(&mut self, partial: Record) -> u64 {
        self.values.extend(partial);
        self.bump()
    }

    /// Removes exactly `keys`; unknown keys are ignored.
    pub fn clear<S: AsRef<str>>(&mut self, keys: &[S]) -> u64 {
        for key in keys {
            self.values.remove(key.as_ref());
        }
        self.bump()
    }

    pub fn clear_all(&mut self) -> u64 {
        self.values.clear();
        self.bump()
    }

    #[must_use]
    pub fn values(&self) -> &Record {
        &self.values
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    fn bump(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}
