// Copyright (c) 2020-2024 The Nocta Foundation

//! Errors which can occur when decoding key material.

use displaydoc::Display;

/// An error which can occur when decoding keys, scalars or signatures.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Error {
    /// Incorrect length for key material, provided `{0}`, required `{1}`
    LengthMismatch(usize, usize),

    /// Invalid curve point encoding
    InvalidCurvePoint,

    /// Scalar is not reduced mod the group order
    NonCanonicalScalar,
}
