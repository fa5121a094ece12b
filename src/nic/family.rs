use super::fdir::FlowType;

/// Driver family of a port, resolved once from the driver name.
/// Families differ in which flow-director quirks they need.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HardwareFamily {
    Ixgbe,
    I40e,
    Other,
}

struct Quirks {
    flex_flow_type: FlowType,
}

const IXGBE_QUIRKS: Quirks = Quirks {
    // ixgbe *only* accepts "unknown" here, any other value is an error
    flex_flow_type: FlowType::Unknown,
};

const I40E_QUIRKS: Quirks = Quirks {
    // i40e accepts anything except "unknown"
    flex_flow_type: FlowType::L2Payload,
};

impl HardwareFamily {
    pub fn from_driver_name(name: &str) -> HardwareFamily {
        match name {
            "rte_ixgbe_pmd" | "net_ixgbe" => HardwareFamily::Ixgbe,
            "rte_i40e_pmd" | "net_i40e" => HardwareFamily::I40e,
            _ => HardwareFamily::Other,
        }
    }

    fn quirks(self) -> &'static Quirks {
        match self {
            HardwareFamily::I40e => &I40E_QUIRKS,
            // Other drivers don't seem to care, so they get the ixgbe value
            HardwareFamily::Ixgbe | HardwareFamily::Other => &IXGBE_QUIRKS,
        }
    }

    pub fn flex_flow_type(self) -> FlowType {
        self.quirks().flex_flow_type
    }
}
