use cfgsrc_core::Version;

/// Source-wide version counter. Owned by one store; never shared through statics.
#[derive(Debug, Default)]
pub struct VersionAllocator {
    last: u64,
}

impl VersionAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the next version. First call returns `v1`.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Version {
        self.last += 1;
        Version::new(self.last)
    }

    /// Most recently minted version, if any.
    pub fn last(&self) -> Option<Version> {
        (self.last > 0).then(|| Version::new(self.last))
    }
}
