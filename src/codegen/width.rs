//! Storage types for the packed record struct.

use crate::tree::{FeatureType, Tree};
use std::fmt;

/// Standard integer widths available for table fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntWidth {
    W8,
    W16,
    W32,
}

impl IntWidth {
    /// Smallest width holding `bound` unsigned. Saturates at 32 bits.
    pub fn for_unsigned(bound: u64) -> Self {
        Self::for_bits(bits_needed(bound))
    }

    /// Smallest width holding `±magnitude` with one bit spent on the sign.
    pub fn for_signed(magnitude: u64) -> Self {
        Self::for_bits(bits_needed(magnitude) + 1)
    }

    fn for_bits(bits: u32) -> Self {
        if bits <= 8 {
            IntWidth::W8
        } else if bits <= 16 {
            IntWidth::W16
        } else {
            IntWidth::W32
        }
    }
}

/// Number of bits needed to write `n` in binary; zero still takes one bit.
pub fn bits_needed(n: u64) -> u32 {
    (u64::BITS - n.leading_zeros()).max(1)
}

/// C type of a generated field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CType {
    Unsigned(IntWidth),
    Signed(IntWidth),
    Float,
    Double,
}

impl CType {
    /// Type for a table index or feature index bounded by `bound`.
    pub fn unsigned_for(bound: u64) -> Self {
        CType::Unsigned(IntWidth::for_unsigned(bound))
    }

    /// Type for the split field of `tree`'s records.
    ///
    /// Non-integral thresholds use the floating type of the feature vector
    /// (`float` unless the features are `double`), so that inline and table
    /// comparisons round the same way.
    ///
    /// `unsigned int` is never paired with signed features: it is the one
    /// unsigned width C does not promote to `int`, so the table loop would
    /// compare negative features as huge unsigned values.
    pub fn split_type(tree: &Tree) -> Self {
        if tree.contains_float() {
            return match tree.feature_type() {
                FeatureType::Double => CType::Double,
                _ => CType::Float,
            };
        }
        let split = match tree.split_range() {
            None => CType::Unsigned(IntWidth::W8),
            Some((lower, upper)) if lower >= 0.0 => CType::unsigned_for(upper as u64),
            Some((lower, upper)) => CType::Signed(IntWidth::for_signed((-lower).max(upper) as u64)),
        };
        match split {
            CType::Unsigned(IntWidth::W32) if tree.feature_type().is_signed() => CType::Signed(IntWidth::W32),
            split => split,
        }
    }

    /// C spelling of the type.
    pub const fn c_name(self) -> &'static str {
        match self {
            CType::Unsigned(IntWidth::W8) => "unsigned char",
            CType::Unsigned(IntWidth::W16) => "unsigned short",
            CType::Unsigned(IntWidth::W32) => "unsigned int",
            CType::Signed(IntWidth::W8) => "signed char",
            CType::Signed(IntWidth::W16) => "short",
            CType::Signed(IntWidth::W32) => "int",
            CType::Float => "float",
            CType::Double => "double",
        }
    }

    /// Render `value` as a C literal of this type.
    pub fn literal(self, value: f64) -> String {
        match self {
            CType::Unsigned(_) | CType::Signed(_) => format!("{}", value as i64),
            CType::Float => {
                let mut text = format!("{}", value as f32);
                if !text.contains('.') {
                    text.push_str(".0");
                }
                text.push('f');
                text
            }
            CType::Double => {
                let mut text = format!("{}", value);
                if !text.contains('.') {
                    text.push_str(".0");
                }
                text
            }
        }
    }
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.c_name())
    }
}

/// Field types of one tree's packed record struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    /// Type of the `feature` field, bounded by the feature dimension.
    pub feature: CType,
    /// Type of the `split` field.
    pub split: CType,
    /// Type of `leftChild`/`rightChild` and of the `subroot` cursor,
    /// bounded by the table length.
    pub index: CType,
}

impl RecordLayout {
    pub fn for_tree(tree: &Tree, table_len: usize) -> Self {
        Self {
            feature: CType::unsigned_for(u64::from(tree.dim())),
            split: CType::split_type(tree),
            index: CType::unsigned_for(table_len as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeBuilder;

    fn tree_with_thresholds(thresholds: &[f64], feature_type: FeatureType) -> Tree {
        let mut builder = TreeBuilder::new("w", 1, feature_type);
        let mut current = builder.leaf(0);
        for (i, &t) in thresholds.iter().enumerate() {
            let leaf = builder.leaf(i as u32 + 1);
            current = builder.split(0, t, leaf, current);
        }
        builder.build(current).unwrap()
    }

    #[test]
    fn test_bits_needed() {
        assert_eq!(bits_needed(0), 1);
        assert_eq!(bits_needed(1), 1);
        assert_eq!(bits_needed(255), 8);
        assert_eq!(bits_needed(256), 9);
    }

    #[test]
    fn test_index_width_boundaries() {
        assert_eq!(CType::unsigned_for(200), CType::Unsigned(IntWidth::W8));
        assert_eq!(CType::unsigned_for(255), CType::Unsigned(IntWidth::W8));
        assert_eq!(CType::unsigned_for(256), CType::Unsigned(IntWidth::W16));
        assert_eq!(CType::unsigned_for(65_535), CType::Unsigned(IntWidth::W16));
        assert_eq!(CType::unsigned_for(65_536), CType::Unsigned(IntWidth::W32));
        assert_eq!(CType::unsigned_for(u64::MAX), CType::Unsigned(IntWidth::W32));
    }

    #[test]
    fn test_signed_widths_reserve_sign_bit() {
        assert_eq!(IntWidth::for_signed(127), IntWidth::W8);
        assert_eq!(IntWidth::for_signed(128), IntWidth::W16);
        assert_eq!(IntWidth::for_signed(32_767), IntWidth::W16);
        assert_eq!(IntWidth::for_signed(32_768), IntWidth::W32);
    }

    #[test]
    fn test_split_type_unsigned() {
        let tree = tree_with_thresholds(&[0.0, 17.0, 300.0], FeatureType::Int);
        assert_eq!(CType::split_type(&tree), CType::Unsigned(IntWidth::W16));
    }

    #[test]
    fn test_split_type_signed() {
        let tree = tree_with_thresholds(&[-100.0, 20.0], FeatureType::Int);
        assert_eq!(CType::split_type(&tree), CType::Signed(IntWidth::W8));

        let tree = tree_with_thresholds(&[-3.0, 200.0], FeatureType::Int);
        assert_eq!(CType::split_type(&tree), CType::Signed(IntWidth::W16));
    }

    #[test]
    fn test_wide_split_follows_feature_signedness() {
        for feature_type in [FeatureType::Int, FeatureType::Short, FeatureType::SignedChar] {
            let tree = tree_with_thresholds(&[70_000.0], feature_type);
            assert_eq!(CType::split_type(&tree), CType::Signed(IntWidth::W32));
        }

        let tree = tree_with_thresholds(&[70_000.0], FeatureType::UnsignedInt);
        assert_eq!(CType::split_type(&tree), CType::Unsigned(IntWidth::W32));

        // Narrow unsigned fields promote to int and stay as they are.
        let tree = tree_with_thresholds(&[65_535.0], FeatureType::Int);
        assert_eq!(CType::split_type(&tree), CType::Unsigned(IntWidth::W16));
    }

    #[test]
    fn test_split_type_never_mixes_signedness_at_32_bits() {
        let features = [
            FeatureType::Int,
            FeatureType::Short,
            FeatureType::SignedChar,
            FeatureType::UnsignedChar,
            FeatureType::UnsignedShort,
            FeatureType::UnsignedInt,
        ];
        let threshold_sets: [&[f64]; 6] = [
            &[0.0],
            &[255.0, 256.0],
            &[65_536.0],
            &[4_000_000_000.0],
            &[-5.0, 70_000.0],
            &[-40_000.0],
        ];
        for feature_type in features {
            for thresholds in threshold_sets {
                let tree = tree_with_thresholds(thresholds, feature_type);
                let split = CType::split_type(&tree);
                if feature_type.is_signed() {
                    assert_ne!(split, CType::Unsigned(IntWidth::W32), "{} {:?}", feature_type, thresholds);
                }
            }
        }
    }

    #[test]
    fn test_split_type_floating() {
        let tree = tree_with_thresholds(&[-100000.0, 0.5], FeatureType::Float);
        assert_eq!(CType::split_type(&tree), CType::Float);

        let tree = tree_with_thresholds(&[0.5], FeatureType::Double);
        assert_eq!(CType::split_type(&tree), CType::Double);

        let tree = tree_with_thresholds(&[0.5], FeatureType::Int);
        assert_eq!(CType::split_type(&tree), CType::Float);
    }

    #[test]
    fn test_split_type_single_leaf() {
        let tree = tree_with_thresholds(&[], FeatureType::Int);
        assert_eq!(CType::split_type(&tree), CType::Unsigned(IntWidth::W8));
    }

    #[test]
    fn test_literals() {
        assert_eq!(CType::Unsigned(IntWidth::W8).literal(5.0), "5");
        assert_eq!(CType::Signed(IntWidth::W16).literal(-300.0), "-300");
        assert_eq!(CType::Float.literal(2.45), "2.45f");
        assert_eq!(CType::Float.literal(3.0), "3.0f");
        assert_eq!(CType::Double.literal(-0.125), "-0.125");
        assert_eq!(CType::Double.literal(7.0), "7.0");
    }

    #[test]
    fn test_record_layout() {
        let tree = tree_with_thresholds(&[1.0, 2.0], FeatureType::Int);
        let layout = RecordLayout::for_tree(&tree, 300);
        assert_eq!(layout.feature, CType::Unsigned(IntWidth::W8));
        assert_eq!(layout.split, CType::Unsigned(IntWidth::W8));
        assert_eq!(layout.index, CType::Unsigned(IntWidth::W16));
        assert_eq!(layout.index.to_string(), "unsigned short");
    }
}
