//! kiln-jinja - Jinja templating layer for kiln
//!
//! Renders node templates with `ref()`, `source()`, `config()`, `var()` and
//! `this`, recording every resolved reference as a dependency of the node.

pub mod environment;
pub mod error;
mod functions;
pub mod resolver;

pub use environment::{JinjaEnvironment, RenderedNode, TargetContext};
pub use error::{JinjaError, JinjaResult};
pub use resolver::{RefResolver, ResolvedRefs};
