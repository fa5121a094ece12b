//! Flow-director (perfect-match flow classification) profile.
//!
//! The profile is static: perfect mode, 64K packet-buffer allocation, status
//! always reported, every header mask zeroed, and a single 16-byte raw
//! payload probe. Only the flex mask's flow type depends on the driver family.

use super::config::Tuning;
use super::family::HardwareFamily;

pub const FLEX_PAYLOAD_LEN: usize = 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FdirMode {
    Perfect,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FdirPballoc {
    K64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FdirStatus {
    ReportAlways,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PayloadType {
    Raw,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum FlowType {
    Unknown = 0,
    L2Payload = 18,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FdirMasks {
    pub vlan_tci: u16,
    pub ipv4_src: u32,
    pub ipv4_dst: u32,
    pub ipv6_src: [u32; 4],
    pub ipv6_dst: [u32; 4],
    pub src_port: u16,
    pub dst_port: u16,
    pub mac_addr_byte: u8,
    pub tunnel_type: u8,
    pub tunnel_id: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlexPayload {
    pub kind: PayloadType,
    pub src_offset: [u16; FLEX_PAYLOAD_LEN],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlexMask {
    pub flow_type: FlowType,
    pub mask: [u8; FLEX_PAYLOAD_LEN],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlexConf {
    pub payloads: Vec<FlexPayload>,
    pub masks: Vec<FlexMask>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FdirConf {
    pub mode: FdirMode,
    pub pballoc: FdirPballoc,
    pub status: FdirStatus,
    pub masks: FdirMasks,
    pub flex: FlexConf,
    pub drop_queue: u8,
}

impl FdirConf {
    pub fn profile(family: HardwareFamily, tuning: &Tuning) -> FdirConf {
        // i40e rejects the payload probe unless all 16 offsets are given.
        // Offsets past the end wrap; `configure` rejects such tunings before they get here.
        let mut src_offset = [0u16; FLEX_PAYLOAD_LEN];
        for (n, offset) in src_offset.iter_mut().enumerate() {
            *offset = tuning.flex_offset.wrapping_add(n as u16);
        }

        FdirConf {
            mode: FdirMode::Perfect,
            pballoc: FdirPballoc::K64,
            status: FdirStatus::ReportAlways,
            masks: FdirMasks::default(),
            flex: FlexConf {
                payloads: vec![FlexPayload { kind: PayloadType::Raw, src_offset }],
                masks: vec![FlexMask { flow_type: family.flex_flow_type(), mask: tuning.flex_mask }],
            },
            drop_queue: tuning.fdir_drop_queue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_is_perfect_match_with_one_probe() {
        let conf = FdirConf::profile(HardwareFamily::Ixgbe, &Tuning::default());
        assert_eq!(conf.mode, FdirMode::Perfect);
        assert_eq!(conf.pballoc, FdirPballoc::K64);
        assert_eq!(conf.status, FdirStatus::ReportAlways);
        assert_eq!(conf.masks, FdirMasks::default());
        assert_eq!(conf.drop_queue, 63);

        assert_eq!(conf.flex.payloads.len(), 1);
        let offsets = conf.flex.payloads[0].src_offset;
        assert_eq!(offsets[0], 42);
        assert_eq!(offsets[15], 57);

        assert_eq!(conf.flex.masks.len(), 1);
        assert_eq!(conf.flex.masks[0].mask[..2], [0xFF, 0xFF]);
        assert!(conf.flex.masks[0].mask[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn only_flow_type_differs_between_families() {
        let tuning = Tuning::default();
        let ixgbe = FdirConf::profile(HardwareFamily::Ixgbe, &tuning);
        let mut i40e = FdirConf::profile(HardwareFamily::I40e, &tuning);
        assert_eq!(i40e.flex.masks[0].flow_type, FlowType::L2Payload);
        i40e.flex.masks[0].flow_type = FlowType::Unknown;
        assert_eq!(ixgbe, i40e);
    }

    #[test]
    fn flex_offset_at_the_top_does_not_overflow() {
        let tuning = Tuning { flex_offset: u16::MAX, ..Tuning::default() };
        let conf = FdirConf::profile(HardwareFamily::Ixgbe, &tuning);
        assert_eq!(conf.flex.payloads[0].src_offset[0], u16::MAX);
        assert_eq!(conf.flex.payloads[0].src_offset[1], 0);
    }
}
