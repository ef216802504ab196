//! # amd64-asm
//!
//! A runtime x86-64 assembler core built around labels and fixups: emit
//! instructions that reference not-yet-known positions, bind the labels as
//! the code takes shape, and resolve everything in a final in-place patching
//! pass.
//!
//! The engine is strictly two-pass with no re-layout: every label-referencing
//! instruction reserves a fixed-width placeholder encoding up front (the
//! widest legal relative form by default), and the resolution pass rewrites
//! the reserved bytes without ever moving code.  A target that cannot be
//! represented in the reserved width is a hard error, never a silent
//! truncation.
//!
//! ## Quick start
//!
//! ```
//! use amd64_asm::{Assembler, Reg64};
//!
//! let mut asm = Assembler::new();
//! let skip = asm.create_label();
//! asm.jz(skip);               // forward reference
//! asm.lea(Reg64::Rax, skip);  // RIP-relative address of the same spot
//! asm.bind(skip)?;
//! asm.ret();
//! let code = asm.finish()?;
//! assert_eq!(code.bytes().last(), Some(&0xC3));
//! # Ok::<(), amd64_asm::AsmError>(())
//! ```
//!
//! ## Feature flags
//!
//! - `std` *(default)* — implements `std::error::Error` for [`AsmError`].
//!   Disable for `no_std` + `alloc` environments.
//! - `serde` — `Serialize`/`Deserialize` for the public data types.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::module_name_repetitions
)]

extern crate alloc;

mod assembler;
mod buffer;
mod error;
mod fixup;
mod label;
pub mod raw;

pub use assembler::{Assembler, AssemblyResult};
pub use buffer::CodeBuffer;
pub use error::AsmError;
pub use fixup::{AppliedFixup, Fixup, FixupKind, OffsetWidth, Width, WidthSet};
pub use label::{Label, LabelTable};
pub use raw::{Cond, LoopOp, Reg64};
