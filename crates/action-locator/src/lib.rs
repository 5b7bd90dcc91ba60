//! Frame and element location.
//!
//! - [`FrameLocator`]: finds the report frame by what it contains, since
//!   frame ids and URLs shift between navigations and deployments
//! - [`FallbackResolver`]: an ordered chain of lookup strategies (precise
//!   attribute, role/name, structural heuristic); the first one resolving a
//!   single interactable element wins

pub mod errors;
pub mod frame;
pub mod resolver;
pub mod types;

pub use errors::*;
pub use frame::*;
pub use resolver::*;
pub use types::*;
