//! Transfer directions, access kinds and device classes.
//!
//! The integer values of [`TransferType`] and [`DeviceClass`] travel in
//! code-generation messages and must not be reordered.

use serde::{Serialize, Deserialize};
use std::fmt;

/// Direction(s) a buffer must move across the host/accelerator boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TransferType {
    #[default]
    Unknown = 0,
    In = 1,
    Out = 2,
    InOut = 3,
    /// Temporary unless some access says otherwise
    Tmp = 4,
}

/// Kind of a memory access reported by the polyhedral analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Read,
    MustWrite,
    MayWrite,
}

impl AccessKind {
    pub fn is_write(&self) -> bool {
        matches!(self, AccessKind::MustWrite | AccessKind::MayWrite)
    }
}

impl TransferType {
    /// Refine the classification with one more access.
    ///
    /// `Tmp` behaves like `Unknown` here: any concrete access overrides it.
    pub fn join_access(self, access: AccessKind) -> TransferType {
        use TransferType::*;
        match (self, access.is_write()) {
            (Unknown | Tmp, false) => In,
            (Unknown | Tmp, true) => Out,
            (In, false) => In,
            (In, true) => InOut,
            (Out, false) => InOut,
            (Out, true) => Out,
            (InOut, _) => InOut,
        }
    }

    /// Join two classifications of the same buffer from different calls.
    ///
    /// `Unknown` and `Tmp` on the incoming side never change a classification.
    pub fn join_sibling(self, other: TransferType) -> TransferType {
        use TransferType::*;
        match (self, other) {
            (_, Unknown | Tmp) => self,
            (Unknown | Tmp, _) => other,
            (InOut, _) | (_, InOut) => InOut,
            (In, Out) | (Out, In) => InOut,
            (a, _) => a,
        }
    }

    /// Position in the order `Unknown < {In, Out} < InOut`; `Tmp` ranks with `Unknown`.
    pub fn rank(&self) -> u8 {
        match self {
            TransferType::Unknown | TransferType::Tmp => 0,
            TransferType::In | TransferType::Out => 1,
            TransferType::InOut => 2,
        }
    }

    /// Whether `self` carries at least the directions of `other`.
    pub fn covers(&self, other: TransferType) -> bool {
        match other {
            TransferType::Unknown | TransferType::Tmp => true,
            TransferType::InOut => *self == TransferType::InOut,
            dir => *self == dir || *self == TransferType::InOut,
        }
    }

    /// Whether data has to come back to the host after the kernel ran.
    pub fn needs_read_back(&self) -> bool {
        !matches!(self, TransferType::In)
    }
}

impl From<TransferType> for u8 {
    fn from(t: TransferType) -> u8 {
        t as u8
    }
}

impl TryFrom<u8> for TransferType {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(TransferType::Unknown),
            1 => Ok(TransferType::In),
            2 => Ok(TransferType::Out),
            3 => Ok(TransferType::InOut),
            4 => Ok(TransferType::Tmp),
            other => Err(format!("invalid transfer type {}", other)),
        }
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferType::Unknown => "UNKNOWN",
            TransferType::In => "IN",
            TransferType::Out => "OUT",
            TransferType::InOut => "IN_OUT",
            TransferType::Tmp => "TMP",
        };
        write!(f, "{}", s)
    }
}

/// Offload target taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DeviceClass {
    /// Sequential host execution of the original code
    Legacy = 0,
    /// Multi-core CPU through OpenCL
    MultiCore = 1,
    Gpu = 2,
    /// Many-core accelerator (MIC)
    ManyCore = 3,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 4] = [
        DeviceClass::Legacy,
        DeviceClass::MultiCore,
        DeviceClass::Gpu,
        DeviceClass::ManyCore,
    ];

    /// Classes that own a device context, in residency lookup order.
    pub const ACCELERATORS: [DeviceClass; 3] = [
        DeviceClass::MultiCore,
        DeviceClass::Gpu,
        DeviceClass::ManyCore,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn is_accelerator(&self) -> bool {
        *self != DeviceClass::Legacy
    }
}

impl From<DeviceClass> for u8 {
    fn from(d: DeviceClass) -> u8 {
        d as u8
    }
}

impl TryFrom<u8> for DeviceClass {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        DeviceClass::ALL
            .get(v as usize)
            .copied()
            .ok_or_else(|| format!("invalid device class {}", v))
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceClass::Legacy => "LEG",
            DeviceClass::MultiCore => "MCPU",
            DeviceClass::Gpu => "GPU",
            DeviceClass::ManyCore => "MIC",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL_TYPES: [TransferType; 5] = [
        TransferType::Unknown,
        TransferType::In,
        TransferType::Out,
        TransferType::InOut,
        TransferType::Tmp,
    ];

    #[test]
    fn test_access_table() {
        use TransferType::*;
        let expected = [
            (Unknown, In, Out),
            (In, In, InOut),
            (Out, InOut, Out),
            (InOut, InOut, InOut),
            (Tmp, In, Out),
        ];
        for (current, read, write) in expected {
            assert_eq!(current.join_access(AccessKind::Read), read);
            assert_eq!(current.join_access(AccessKind::MustWrite), write);
            assert_eq!(current.join_access(AccessKind::MayWrite), write);
        }
    }

    #[test]
    fn test_sibling_join() {
        use TransferType::*;
        assert_eq!(In.join_sibling(Out), InOut);
        assert_eq!(Out.join_sibling(In), InOut);
        assert_eq!(In.join_sibling(In), In);
        assert_eq!(In.join_sibling(Tmp), In);
        assert_eq!(Out.join_sibling(Unknown), Out);
        assert_eq!(Unknown.join_sibling(In), In);
        assert_eq!(In.join_sibling(InOut), InOut);
    }

    #[test]
    fn test_wire_values() {
        assert_eq!(serde_json::to_string(&TransferType::InOut).unwrap(), "3");
        assert_eq!(serde_json::from_str::<TransferType>("4").unwrap(), TransferType::Tmp);
        assert_eq!(serde_json::to_string(&DeviceClass::ManyCore).unwrap(), "3");
        assert!(serde_json::from_str::<DeviceClass>("7").is_err());
    }

    fn arb_type() -> impl Strategy<Value = TransferType> {
        prop::sample::select(ALL_TYPES.to_vec())
    }

    fn arb_access() -> impl Strategy<Value = AccessKind> {
        prop::sample::select(vec![AccessKind::Read, AccessKind::MustWrite, AccessKind::MayWrite])
    }

    proptest! {
        #[test]
        fn prop_join_access_is_monotone(t in arb_type(), k in arb_access()) {
            let joined = t.join_access(k);
            prop_assert!(joined.covers(t));
            prop_assert!(joined.rank() >= t.rank());
        }

        #[test]
        fn prop_join_access_is_idempotent(t in arb_type(), k in arb_access()) {
            let once = t.join_access(k);
            prop_assert_eq!(once.join_access(k), once);
        }

        #[test]
        fn prop_join_sibling_is_monotone(a in arb_type(), b in arb_type()) {
            let joined = a.join_sibling(b);
            prop_assert!(joined.covers(a));
            prop_assert!(joined.covers(b));
        }
    }
}
