//! Payloads exchanged with the remote code-generation server.
//!
//! Every message is preceded by an 8-byte [`FrameHeader`]: the message kind
//! as a 32-bit integer followed by the payload size in bytes.

use crate::analysis::scop::DepthOverrides;
use crate::ir::summary::RegionSummaryMap;
use serde::{Serialize, Deserialize};
use std::fmt;

/// Message tags. The numeric values are part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
#[repr(i32)]
pub enum MessageKind {
    ReqCodeGen = 1,
    RspCodeGenComplete = 2,
    ReqLlvmIr = 3,
    RspLlvmIr = 4,
    BinaryStream = 5,
}

impl From<MessageKind> for i32 {
    fn from(kind: MessageKind) -> i32 {
        kind as i32
    }
}

impl TryFrom<i32> for MessageKind {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageKind::ReqCodeGen),
            2 => Ok(MessageKind::RspCodeGenComplete),
            3 => Ok(MessageKind::ReqLlvmIr),
            4 => Ok(MessageKind::RspLlvmIr),
            5 => Ok(MessageKind::BinaryStream),
            other => Err(format!("unknown message kind {}", other)),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::ReqCodeGen => "REQ_CODEGEN",
            MessageKind::RspCodeGenComplete => "RSP_CODEGEN_COMPLETE",
            MessageKind::ReqLlvmIr => "REQ_LLVM_IR",
            MessageKind::RspLlvmIr => "RSP_LLVM_IR",
            MessageKind::BinaryStream => "BINARY_STREAM",
        };
        write!(f, "{}", name)
    }
}

/// Fixed-size message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub kind: i32,
    /// Payload size in bytes
    pub size: u32,
}

impl FrameHeader {
    pub const LEN: usize = 8;

    pub fn new(kind: MessageKind, size: u32) -> Self {
        Self { kind: kind.into(), size }
    }

    pub fn message_kind(&self) -> Option<MessageKind> {
        MessageKind::try_from(self.kind).ok()
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[..4].copy_from_slice(&self.kind.to_le_bytes());
        out[4..].copy_from_slice(&self.size.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        let [k0, k1, k2, k3, s0, s1, s2, s3] = bytes;
        Self {
            kind: i32::from_le_bytes([k0, k1, k2, k3]),
            size: u32::from_le_bytes([s0, s1, s2, s3]),
        }
    }
}

/// One region to generate kernels for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRequest {
    pub name: String,
    pub max_codegen_loop_depth: usize,
}

/// Request for kernel generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeGenRequest {
    pub parent_function: String,
    pub regions: Vec<RegionRequest>,
    /// Local work-group sizes, 0 lets the device runtime pick
    pub block_size: [u32; 2],
}

impl CodeGenRequest {
    /// Build a request for every region of `summaries`.
    ///
    /// Depth overrides follow the same policy as detection but keep their
    /// own position in the list.
    pub fn from_summaries(
        parent_function: impl Into<String>,
        summaries: &RegionSummaryMap,
        depth_overrides: &[usize],
        block_size: [u32; 2],
    ) -> Self {
        let mut overrides = DepthOverrides::new(depth_overrides.to_vec());
        let regions = summaries
            .values()
            .map(|s| RegionRequest {
                name: s.function.clone(),
                max_codegen_loop_depth: overrides.next(s.max_parallel_depth),
            })
            .collect();
        Self { parent_function: parent_function.into(), regions, block_size }
    }
}

/// A generated kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelInfo {
    pub region: String,
    pub kernel_name: String,
    /// Kernel argument positions that receive work-group sizes
    pub workgroup_arg_index: Vec<usize>,
}

/// Reply to a [`CodeGenRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodeGenComplete {
    /// Size of the binary stream that follows
    pub binary_size: u64,
    pub regions: Vec<KernelInfo>,
}

impl CodeGenComplete {
    pub fn kernels_for<'a>(&'a self, region: &'a str) -> impl Iterator<Item = &'a KernelInfo> + 'a {
        self.regions.iter().filter(move |k| k.region == region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::summary::RegionSummary;

    fn summaries(depths: &[usize]) -> RegionSummaryMap {
        depths
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let mut s = RegionSummary::new(format!("kernel_{}", i));
                s.max_parallel_depth = *d;
                (s.function.clone(), s)
            })
            .collect()
    }

    #[test]
    fn test_message_kind_is_wire_integer() {
        assert_eq!(serde_json::to_string(&MessageKind::RspCodeGenComplete).unwrap(), "2");
        let kind: MessageKind = serde_json::from_str("5").unwrap();
        assert_eq!(kind, MessageKind::BinaryStream);
        assert!(serde_json::from_str::<MessageKind>("9").is_err());
    }

    #[test]
    fn test_header_bytes() {
        let header = FrameHeader::new(MessageKind::ReqCodeGen, 300);
        let bytes = header.to_bytes();
        assert_eq!(bytes, [1, 0, 0, 0, 44, 1, 0, 0]);
        assert_eq!(FrameHeader::from_bytes(bytes), header);
        assert_eq!(header.message_kind(), Some(MessageKind::ReqCodeGen));
    }

    #[test]
    fn test_request_uses_automatic_depth_without_overrides() {
        let req = CodeGenRequest::from_summaries("main", &summaries(&[2, 1]), &[], [0, 0]);
        let depths: Vec<usize> = req.regions.iter().map(|r| r.max_codegen_loop_depth).collect();
        assert_eq!(depths, vec![2, 1]);
    }

    #[test]
    fn test_request_reuses_last_override() {
        let req = CodeGenRequest::from_summaries("main", &summaries(&[3, 3, 3]), &[1, 2], [16, 16]);
        let depths: Vec<usize> = req.regions.iter().map(|r| r.max_codegen_loop_depth).collect();
        assert_eq!(depths, vec![1, 2, 2]);
        assert_eq!(req.block_size, [16, 16]);
    }

    #[test]
    fn test_kernels_for_region() {
        let done = CodeGenComplete {
            binary_size: 1024,
            regions: vec![
                KernelInfo { region: "a".into(), kernel_name: "a_k0".into(), workgroup_arg_index: vec![3] },
                KernelInfo { region: "b".into(), kernel_name: "b_k0".into(), workgroup_arg_index: vec![] },
            ],
        };
        let names: Vec<&str> = done.kernels_for("a").map(|k| k.kernel_name.as_str()).collect();
        assert_eq!(names, vec!["a_k0"]);
    }
}
