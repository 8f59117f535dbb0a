// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Storage engine of segment scans.

mod error;
pub mod segment;

pub use self::error::*;
pub use self::segment::*;
