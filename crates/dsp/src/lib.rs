//! Pure/stateful signal-processing library: the circular window (C3), the
//! feature pipeline (C4), the rolling normalizer (C5) and the classifier
//! capability (C6). Nothing here touches async or I/O; the workers crate
//! wraps these in actors.

pub mod binning;
pub mod classifier;
pub mod normalizer;
pub mod pipeline;
pub mod window;

pub use binning::bin_frame;
pub use classifier::{Classifier, LogisticRegressionClassifier};
pub use normalizer::RollingNormalizer;
pub use pipeline::{PipelineSettings, LogMode};
pub use window::CircularWindow;
