//! Transfer sizes from symbolic dimension bounds.

use crate::expr::evaluate;
use crate::utils::errors::{ExprError, ExprErrorKind};
use crate::utils::strings::{has_ident, substitute_idents};
use std::collections::HashMap;

/// Evaluate a dimension size expression for one call.
///
/// Names found in `scalars` (the call's integer arguments, keyed by the
/// region's parameter names) are replaced by their values first.
pub fn resolve_transfer_size(size_expr: &str, scalars: &HashMap<String, i64>) -> Result<i64, ExprError> {
    let concrete = substitute_idents(size_expr, |ident| scalars.get(ident).map(|v| v.to_string()));
    if has_ident(&concrete) {
        return Err(ExprError::new(ExprErrorKind::InvalidTerminal, "unbound name in size expression", concrete));
    }
    evaluate(&concrete)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_image_buffer_size() {
        let scalars: HashMap<String, i64> = [("rows".to_string(), 720), ("cols".to_string(), 1280)].into();
        let size = resolve_transfer_size("2 + 3840*(-1 + rows) + 3*(-1 + cols) + 1", &scalars).unwrap();
        assert_eq!(size, 2762882);
    }

    #[test]
    fn test_unbound_name_is_an_error() {
        let scalars = HashMap::new();
        let err = resolve_transfer_size("(-1 + n) + 1", &scalars).unwrap_err();
        assert_eq!(err.kind, ExprErrorKind::InvalidTerminal);
    }
}
