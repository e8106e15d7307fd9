//! # hubit-path
//!
//! Hierarchical, indexable attribute paths for hubit calculation models.
//!
//! A path addresses a location in a JSON-like tree: keys are separated by
//! `.` and sequence elements are selected with `[...]`.
//!
//! ## Index forms
//!
//! | Form | Meaning | Context |
//! |------|---------|---------|
//! | `[3]` | Concrete, zero-based index | query, template |
//! | `[:]` | Every element | query |
//! | `[-1]` | Last element | query |
//! | `[IDX]` | Binder: one worker per element | template |
//! | `[:@IDX]` | Range binder: all elements gathered into a list | template (consumes) |
//!
//! ## Usage
//!
//! ```rust
//! use hubit_path::{PathAddress, Bindings};
//!
//! let template = PathAddress::parse_template("list[IDX].area").unwrap();
//! let concrete = PathAddress::parse_query("list[1].area").unwrap();
//!
//! let bindings = template.match_concrete(&concrete).unwrap();
//! assert_eq!(bindings.get("IDX"), Some(&1));
//! assert_eq!(template.bind(&bindings).unwrap(), concrete);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod address;
mod error;
mod parser;

pub use address::{bind_index, matches, Bindings, InternalPath, PathAddress, Segment};
pub use error::{PathError, PathResult};
pub use parser::{parse, to_internal};
