use std::fmt;

/// Runtime datatype tag. The high bit marks persistent (static or uncounted)
/// flavors of the refcounted types; everything that aggregates types strips
/// it first via [`DataType::modulo_persistence`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataType(u8);

impl DataType {
    pub const PERSISTENT_BIT: u8 = 0x80;

    pub const UNINIT: DataType = DataType(0);
    pub const NULL: DataType = DataType(1);
    pub const BOOL: DataType = DataType(2);
    pub const INT: DataType = DataType(3);
    pub const DBL: DataType = DataType(4);
    pub const STR: DataType = DataType(5);
    pub const ARR: DataType = DataType(6);

    pub const PERSISTENT_STR: DataType = DataType(5 | Self::PERSISTENT_BIT);
    pub const PERSISTENT_ARR: DataType = DataType(6 | Self::PERSISTENT_BIT);

    /// Sentinel for "no datatype recorded".
    pub const INVALID: DataType = DataType(0xff);

    /// Number of distinct base (persistence-stripped) datatypes.
    pub const NUM_BASE: usize = 7;

    pub fn from_raw(raw: u8) -> DataType {
        DataType(raw)
    }

    pub fn raw(self) -> u8 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    pub fn modulo_persistence(self) -> DataType {
        if self == Self::INVALID {
            return self;
        }
        DataType(self.0 & !Self::PERSISTENT_BIT)
    }

    /// Index of the persistence-stripped datatype, for fixed-size histograms.
    pub fn base_index(self) -> usize {
        debug_assert!(self.is_valid());
        (self.0 & !Self::PERSISTENT_BIT) as usize
    }

    pub fn name(self) -> &'static str {
        match self.modulo_persistence() {
            Self::UNINIT => "Uninit",
            Self::NULL => "Null",
            Self::BOOL => "Bool",
            Self::INT => "Int",
            Self::DBL => "Dbl",
            Self::STR => "Str",
            Self::ARR => "Arr",
            _ => "Invalid",
        }
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modulo_persistence() {
        assert_eq!(DataType::PERSISTENT_STR.modulo_persistence(), DataType::STR);
        assert_eq!(DataType::INT.modulo_persistence(), DataType::INT);
        assert_eq!(DataType::INVALID.modulo_persistence(), DataType::INVALID);
    }

    #[test]
    fn test_base_index_bounds() {
        for dt in [
            DataType::UNINIT,
            DataType::NULL,
            DataType::BOOL,
            DataType::INT,
            DataType::DBL,
            DataType::STR,
            DataType::ARR,
            DataType::PERSISTENT_STR,
        ] {
            assert!(dt.base_index() < DataType::NUM_BASE);
        }
    }
}
