// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Read path of columnar segment files: index loading, block pruning and
//! vectorized block scans.

#![deny(unused_must_use)]

pub mod array;
pub mod catalog;
pub mod storage;
pub mod types;
