// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The error results used by this library.

use crate::evcodec::EvCodecError;
use crate::translate::TranslateError;
use policy::PolicyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Extended-values codec failure. Decoding a vlan pair this controller
    /// never issued is an invariant violation; callers treat it as fatal.
    #[error(transparent)]
    Codec(#[from] EvCodecError),

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("install worker unavailable: {0}")]
    Worker(&'static str),
}
