//! Numeric buffer owned by the array pipeline
//!
//! Allocation is fallible: a buffer that cannot be reserved is reported as
//! an [`AllocationError`] instead of aborting the process.

use crate::error::AllocationError;
use std::mem;

/// Contiguous, fixed-length sequence of `f64` values
#[derive(Debug, Clone, PartialEq)]
pub struct NumericBuffer {
    data: Vec<f64>,
}

impl NumericBuffer {
    /// Allocate `len` zeroed elements
    pub fn allocate(len: usize) -> Result<Self, AllocationError> {
        let error = || AllocationError {
            elements: len,
            bytes: len.saturating_mul(mem::size_of::<f64>()),
        };

        // Fallible reservation first; `vec!` itself would abort
        Vec::<f64>::new().try_reserve_exact(len).map_err(|_| error())?;

        // Zeroed allocation: pages stay untouched until the parallel
        // initialize stage writes them
        let data = vec![0.0; len];

        Ok(Self { data })
    }

    /// Buffer with every element set to `value`
    pub fn filled(len: usize, value: f64) -> Result<Self, AllocationError> {
        let mut buffer = Self::allocate(len)?;
        buffer.data.fill(value);
        Ok(buffer)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the element storage in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len() * mem::size_of::<f64>()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }
}
