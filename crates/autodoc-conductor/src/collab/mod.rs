//! External collaborators the stages call out to: git, the Python parser,
//! the completion service, the similarity index and the site toolchain.
//! Each sits behind a trait so runs can be driven with test doubles.

pub mod acquire;
pub mod analyze;
pub mod completion;
pub mod index;
pub mod mock;
pub mod python;
pub mod site;
