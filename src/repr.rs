//! Value representation model for the tagged numeric encoding.
//!
//! The source IR annotates every value with a representation. Small integers
//! are carried in tagged machine words: the payload lives in the high bits
//! and the low tag bits are zero, so untagging is a plain right shift. Two
//! tagging widths exist depending on the target word size; only the wide one
//! (32-bit payload, shift by 32) is supported by the lowering today.

use cranelift_codegen::ir::condcodes::IntCC;

/// Representation of an IR value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Representation {
    /// Machine word that is either a small integer or a heap pointer.
    Tagged,
    /// Untagged small-integer-only numeric value.
    Smi,
    /// Full 32-bit integer.
    Integer32,
    Double,
    External,
}

/// Width of the small-integer payload inside a tagged word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TaggingMode {
    /// 32-bit payload shifted into the high half of a 64-bit word.
    #[default]
    Wide,
    /// 31-bit payload with a one-bit shift. Untagging this variant needs an
    /// arithmetic shift and is not implemented.
    Narrow,
}

impl TaggingMode {
    /// Number of bits the payload is shifted by when tagging.
    pub const fn shift(self) -> i64 {
        match self {
            TaggingMode::Wide => 32,
            TaggingMode::Narrow => 1,
        }
    }
}

/// Encode a 32-bit integer as a tagged small integer.
///
/// Only valid when the value is known to fit the payload width; callers that
/// cannot prove that must go through an allocation path instead.
pub fn smi_from_int32(value: i32, mode: TaggingMode) -> i64 {
    (value as i64) << mode.shift()
}

/// Decode a tagged small integer back to its 32-bit payload.
///
/// The shift is arithmetic so the narrow mode's sign bit survives; under
/// wide tagging the payload fills the truncated word either way. The
/// lowering itself still refuses narrow untagging; the helper is total.
pub fn int32_from_smi(bits: i64, mode: TaggingMode) -> i32 {
    (bits >> mode.shift()) as i32
}

/// Source-level operator tokens that can reach a numeric comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    Eq,
    EqStrict,
    Ne,
    NeStrict,
    Lt,
    Gt,
    Lte,
    Gte,
    In,
    InstanceOf,
}

/// Map a relational token to a native comparison predicate.
///
/// Total over the six relational operators in both signed and unsigned form.
/// `In` and `InstanceOf` are lowered through runtime calls long before this
/// table and must never reach it.
pub fn token_to_predicate(op: Token, is_unsigned: bool) -> IntCC {
    match op {
        Token::Eq | Token::EqStrict => IntCC::Equal,
        Token::Ne | Token::NeStrict => IntCC::NotEqual,
        Token::Lt => {
            if is_unsigned {
                IntCC::UnsignedLessThan
            } else {
                IntCC::SignedLessThan
            }
        }
        Token::Gt => {
            if is_unsigned {
                IntCC::UnsignedGreaterThan
            } else {
                IntCC::SignedGreaterThan
            }
        }
        Token::Lte => {
            if is_unsigned {
                IntCC::UnsignedLessThanOrEqual
            } else {
                IntCC::SignedLessThanOrEqual
            }
        }
        Token::Gte => {
            if is_unsigned {
                IntCC::UnsignedGreaterThanOrEqual
            } else {
                IntCC::SignedGreaterThanOrEqual
            }
        }
        Token::In | Token::InstanceOf => {
            unreachable!("{op:?} must not reach numeric comparison lowering")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELATIONAL: [Token; 6] = [
        Token::Eq,
        Token::Ne,
        Token::Lt,
        Token::Gt,
        Token::Lte,
        Token::Gte,
    ];

    #[test]
    fn test_predicate_total_over_relational_tokens() {
        for &signedness in &[false, true] {
            let preds: Vec<IntCC> = RELATIONAL
                .iter()
                .map(|&op| token_to_predicate(op, signedness))
                .collect();
            // Each operator maps to its own predicate within a signedness.
            for i in 0..preds.len() {
                for j in 0..i {
                    assert_ne!(preds[i], preds[j]);
                }
            }
        }
    }

    #[test]
    fn test_strict_equality_folds_onto_equality() {
        assert_eq!(
            token_to_predicate(Token::EqStrict, false),
            token_to_predicate(Token::Eq, false)
        );
        assert_eq!(
            token_to_predicate(Token::NeStrict, true),
            token_to_predicate(Token::Ne, true)
        );
    }

    #[test]
    fn test_unsigned_flag_selects_unsigned_predicates() {
        assert_eq!(token_to_predicate(Token::Lt, true), IntCC::UnsignedLessThan);
        assert_eq!(
            token_to_predicate(Token::Gte, true),
            IntCC::UnsignedGreaterThanOrEqual
        );
        assert_eq!(token_to_predicate(Token::Lt, false), IntCC::SignedLessThan);
    }

    #[test]
    #[should_panic]
    fn test_in_operator_is_unreachable() {
        token_to_predicate(Token::In, false);
    }

    #[test]
    #[should_panic]
    fn test_instanceof_operator_is_unreachable() {
        token_to_predicate(Token::InstanceOf, true);
    }

    #[test]
    fn test_smi_round_trip_under_wide_tagging() {
        for &x in &[0, 1, -1, 42, i32::MAX, i32::MIN, -123456] {
            let tagged = smi_from_int32(x, TaggingMode::Wide);
            assert_eq!(int32_from_smi(tagged, TaggingMode::Wide), x);
            // Low half of the tagged word stays zero under wide tagging.
            assert_eq!(tagged & 0xffff_ffff, 0);
        }
    }

    #[test]
    fn test_smi_round_trip_under_narrow_tagging() {
        // Narrow payloads are 31-bit; negatives need the sign-preserving
        // untag shift.
        for &x in &[0, 1, -1, 42, -123456, i32::MAX / 2, i32::MIN / 2] {
            let tagged = smi_from_int32(x, TaggingMode::Narrow);
            assert_eq!(int32_from_smi(tagged, TaggingMode::Narrow), x);
        }
    }

    #[test]
    fn test_tagging_shift_widths() {
        assert_eq!(TaggingMode::Wide.shift(), 32);
        assert_eq!(TaggingMode::Narrow.shift(), 1);
    }
}
