//! Ordered resource acquisition with automatic reverse-order teardown.
//!
//! Setting up a resource through a C-style API usually takes several stages
//! (create, configure, bind) and any of them can fail. A [`Sequencer`] holds
//! one [`Step`] per stage: an init action plus the undo action that reverses
//! it. Steps run in registration order; on the first failure the steps that
//! already succeeded are undone in reverse order. The same teardown runs on
//! [`Sequencer::uninitialize`] and when the sequencer is dropped.
//!
//! ```
//! use std::cell::RefCell;
//!
//! use seqraii::Sequencer;
//!
//! let log = RefCell::new(Vec::new());
//! {
//!     let mut setup = Sequencer::new();
//!     setup.add_step_with_undo(
//!         || {
//!             log.borrow_mut().push("allocate");
//!             true
//!         },
//!         || log.borrow_mut().push("free"),
//!     );
//!     setup.add_step(|| Err::<(), _>("configure failed"));
//!
//!     assert!(!setup.initialize());
//! }
//! assert_eq!(*log.borrow(), ["allocate", "free"]);
//! ```

mod audit;
mod error;
mod outcome;
mod sequencer;
mod step;

pub use audit::{AuditLog, StepRecord, StepStatus};
pub use error::StepError;
pub use outcome::{IntoStepOutcome, IntoUndoOutcome};
pub use sequencer::Sequencer;
pub use step::{Step, StepState};
