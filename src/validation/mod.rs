/*!
 * QA checks for translated chunks.
 *
 * - `placeholders`: every issued token comes back exactly once
 * - `structure`: fence lines, math delimiters and URLs match the source
 * - `service`: the `QaGate` that runs all checks and reports failures
 */

pub mod placeholders;
pub mod service;
pub mod structure;

pub use placeholders::{PlaceholderValidationResult, PlaceholderValidator};
pub use service::{QaFailure, QaGate, QaInput, QaReport};
pub use structure::{MathMarker, StructureCounts};
