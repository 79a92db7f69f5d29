//! This module provides builders for the metadata of managed child objects.
//!
//! They are not _pure_ builders: [`meta::OwnerReferenceBuilder::build`] refuses to produce a
//! reference that the garbage collector could not resolve.
pub mod meta;
