//! Color management boundary.
//!
//! The actual transform engine (an OCIO-style processor) lives outside this
//! crate; render pipelines only see the trait.

use crate::image::ImageBuffer;

/// Parameters a host passes to construct a color transform processor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize, serde::Deserialize))]
pub struct ColorTransformInfo {
    /// Config name, e.g. a filmic view transform.
    pub config: String,

    /// Optional look within the config.
    pub look_name: Option<String>,
}

/// Applies a color transform to an image in place.
///
/// Errors are reported as plain strings so the backend's own diagnostics pass
/// through verbatim.
pub trait ColorProcessor: Send + Sync {
    fn apply(&self, image: &mut ImageBuffer) -> Result<(), String>;
}
