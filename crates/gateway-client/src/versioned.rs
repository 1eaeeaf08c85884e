use agentfield_protocol::StateVersion;

/// A value reconciled last-write-wins by its [`StateVersion`].
///
/// Consumers holding state derived from stamped events keep it in one of
/// these so an older payload arriving late never overwrites a newer one.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    version: Option<StateVersion>,
    value: T,
}

impl<T> Versioned<T> {
    pub fn new(value: T) -> Self {
        Self {
            version: None,
            value,
        }
    }

    pub fn with_version(value: T, version: StateVersion) -> Self {
        Self {
            version: Some(version),
            value,
        }
    }

    /// Replace the value if `version` is newer than the current one.
    /// Returns whether the value changed.
    pub fn apply(&mut self, version: StateVersion, value: T) -> bool {
        if self.version.is_some_and(|current| !version.supersedes(&current)) {
            return false;
        }
        self.version = Some(version);
        self.value = value;
        true
    }

    /// Replace unconditionally, e.g. from a resync snapshot.
    pub fn reset(&mut self, value: T, version: Option<StateVersion>) {
        self.value = value;
        self.version = version;
    }

    pub fn version(&self) -> Option<StateVersion> {
        self.version
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: Default> Default for Versioned<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
