//! Timespans - an interval index for time-bounded musical events.
//!
//! # Quick Start
//!
//! ```
//! use std::rc::Rc;
//!
//! use timespans::element::{ElementTimespan, Note};
//! use timespans::tree::TimespanCollection;
//!
//! // Index a few notes by where they sound
//! let mut collection = TimespanCollection::new();
//! collection
//!     .insert([
//!         ElementTimespan::anchored(Rc::new(Note::new([60.0]))).offsets(0.0, 2.0).build().unwrap(),
//!         ElementTimespan::anchored(Rc::new(Note::new([64.0]))).offsets(1.0, 2.0).build().unwrap(),
//!     ])
//!     .unwrap();
//!
//! // Ask what sounds at beat 1
//! let verticality = collection.verticality_at(1.0);
//! assert_eq!(verticality.degree_of_overlap(), 2);
//! assert_eq!(verticality.pitch_set().len(), 2);
//! ```

pub mod config;
pub mod element;
pub mod error;
pub mod horizontality;
pub mod timespan;
pub mod tree;
pub mod verticality;

pub use error::Result;
pub use error::TimespanError;
pub use timespan::Spanned;
pub use timespan::Timespan;
pub use tree::SharedCollection;
pub use tree::TimespanCollection;
