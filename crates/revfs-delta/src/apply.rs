use crate::error::DeltaResult;
use crate::window::DeltaWindow;

/// Apply a complete list of windows to `source`.
pub fn apply_delta(source: &[u8], windows: &[DeltaWindow]) -> DeltaResult<Vec<u8>> {
    let mut applier = DeltaApplier::new(source.to_vec());
    for window in windows {
        applier.push(window)?;
    }
    Ok(applier.finish())
}

/// Incremental window application.
///
/// Owns the source text and accumulates target bytes as windows arrive, so a
/// caller can feed windows from a stream without buffering them.
#[derive(Debug, Default)]
pub struct DeltaApplier {
    source: Vec<u8>,
    target: Vec<u8>,
    windows: usize,
}

impl DeltaApplier {
    pub fn new(source: Vec<u8>) -> Self {
        Self {
            source,
            target: Vec::new(),
            windows: 0,
        }
    }

    /// Apply one window. On error the target is left as it was before the call.
    pub fn push(&mut self, window: &DeltaWindow) -> DeltaResult<()> {
        let before = self.target.len();
        if let Err(e) = window.apply(&self.source, &mut self.target) {
            self.target.truncate(before);
            return Err(e);
        }
        self.windows += 1;
        Ok(())
    }

    /// Bytes produced so far.
    pub fn target(&self) -> &[u8] {
        &self.target
    }

    /// Number of windows applied.
    pub fn windows_applied(&self) -> usize {
        self.windows
    }

    /// Consume the applier and return the reconstructed target.
    pub fn finish(self) -> Vec<u8> {
        self.target
    }
}
