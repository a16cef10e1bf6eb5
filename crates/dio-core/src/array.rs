//! Provider-level batched access over a list of line handles.
//!
//! Bit `j` of the value bitmap belongs to `lines[j]`. Both helpers stop at the
//! first failing line and return its error unchanged.

use std::sync::Arc;

use crate::error::{DioError, DioResult};
use crate::line::LineHandle;
use crate::mask::LineMask;

/// Read every line in `lines` into bits `0..lines.len()` of `values`.
///
/// Bits of `values` at or beyond `lines.len()` are left untouched.
pub fn read_array(lines: &[Arc<dyn LineHandle>], values: &mut LineMask) -> DioResult<()> {
    check_len(lines.len(), values)?;
    for (j, line) in lines.iter().enumerate() {
        let value = line.read()?;
        values.assign(j, value);
    }
    Ok(())
}

/// Drive every line in `lines` from bits `0..lines.len()` of `values`.
pub fn write_array(lines: &[Arc<dyn LineHandle>], values: &LineMask) -> DioResult<()> {
    check_len(lines.len(), values)?;
    for (j, line) in lines.iter().enumerate() {
        line.write(values.test(j))?;
    }
    Ok(())
}

fn check_len(count: usize, values: &LineMask) -> DioResult<()> {
    if count > values.len() {
        return Err(DioError::invalid_argument(format!(
            "value bitmap holds {} bits, {} lines given",
            values.len(),
            count
        )));
    }
    Ok(())
}
