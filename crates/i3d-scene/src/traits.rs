//! The host adapter contract.
//!
//! This is the only interface the exporter core needs from the host: an
//! ordered object tree addressed by stable string keys. Implementations must
//! not hand out objects that change while an export is running; the core
//! borrows the source immutably for the whole pass.

use crate::scene::SourceObject;

/// Read-only view of a host scene
pub trait SceneSource {
    /// Scene (and default document) name
    fn scene_name(&self) -> &str;

    /// Frames per second used to convert animation frames to milliseconds
    fn frames_per_second(&self) -> f64;

    /// Keys of the top-level objects, in sibling order
    fn root_keys(&self) -> &[String];

    /// Look up an object by key
    fn object(&self, key: &str) -> Option<&SourceObject>;

    /// Number of objects, used as a capacity hint
    fn object_count(&self) -> usize {
        0
    }
}
