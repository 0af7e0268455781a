//! Device capability negotiation.
//!
//! Before any pipeline is built, the advertised device features are reduced
//! to the set of state categories this renderer may declare dynamic.
//! Dynamic logic op is mandatory — without it the whole technique cannot
//! run and [`negotiate`] fails fatally. The remaining categories are
//! optional: when a feature is absent the pipeline builder bakes that state
//! into the pipeline object instead, and the recorder emits no command for
//! it.

use crate::dynamic_state::DynamicStateSet;
use crate::error::RenderError;

/// Dynamic-state features advertised by a device.
///
/// Backends fill this from their native feature query; tests construct it
/// directly to exercise degradation paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceFeatures {
    /// Primitive topology settable at recording time.
    pub dynamic_primitive_topology: bool,
    /// Primitive restart settable at recording time.
    pub dynamic_primitive_restart: bool,
    /// Rasterizer discard settable at recording time.
    pub dynamic_rasterizer_discard: bool,
    /// Depth bias enable settable at recording time.
    pub dynamic_depth_bias_enable: bool,
    /// Logic operation settable at recording time. Mandatory.
    pub dynamic_logic_op: bool,
    /// Anisotropic filtering for the background sampler. Never required;
    /// enabled opportunistically when present.
    pub sampler_anisotropy: bool,
}

impl DeviceFeatures {
    /// Every feature present.
    pub fn all() -> Self {
        Self {
            dynamic_primitive_topology: true,
            dynamic_primitive_restart: true,
            dynamic_rasterizer_discard: true,
            dynamic_depth_bias_enable: true,
            dynamic_logic_op: true,
            sampler_anisotropy: true,
        }
    }

    /// Only the mandatory dynamic logic op present.
    pub fn logic_op_only() -> Self {
        Self {
            dynamic_logic_op: true,
            ..Self::default()
        }
    }
}

/// The negotiated outcome: which optional categories may be declared
/// dynamic this run. Existence of a value implies the mandatory logic-op
/// capability was present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicCapabilities {
    optional: DynamicStateSet,
}

impl DynamicCapabilities {
    /// The optional categories available as dynamic state.
    pub fn optional_states(&self) -> DynamicStateSet {
        self.optional
    }

    /// Whether the given optional categories are all available.
    pub fn supports(&self, states: DynamicStateSet) -> bool {
        self.optional.contains(states)
    }
}

/// Decide the usable dynamic-state categories from the advertised features.
///
/// Fails with [`RenderError::MissingCapability`] when dynamic logic op is
/// absent; optional categories merely narrow the result.
pub fn negotiate(features: &DeviceFeatures) -> Result<DynamicCapabilities, RenderError> {
    if !features.dynamic_logic_op {
        return Err(RenderError::MissingCapability(
            "dynamic logic op".to_string(),
        ));
    }

    let mut optional = DynamicStateSet::empty();
    if features.dynamic_primitive_topology {
        optional |= DynamicStateSet::PRIMITIVE_TOPOLOGY;
    } else {
        log::debug!("dynamic primitive topology unavailable, baking into pipeline");
    }
    if features.dynamic_primitive_restart {
        optional |= DynamicStateSet::PRIMITIVE_RESTART_ENABLE;
    } else {
        log::debug!("dynamic primitive restart unavailable, baking into pipeline");
    }
    if features.dynamic_rasterizer_discard {
        optional |= DynamicStateSet::RASTERIZER_DISCARD_ENABLE;
    } else {
        log::debug!("dynamic rasterizer discard unavailable, baking into pipeline");
    }
    if features.dynamic_depth_bias_enable {
        optional |= DynamicStateSet::DEPTH_BIAS_ENABLE;
    } else {
        log::debug!("dynamic depth bias enable unavailable, baking into pipeline");
    }

    log::info!("negotiated optional dynamic state: {optional:?}");
    Ok(DynamicCapabilities { optional })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_logic_op_is_fatal() {
        let features = DeviceFeatures {
            dynamic_logic_op: false,
            ..DeviceFeatures::all()
        };
        let err = negotiate(&features).unwrap_err();
        assert!(matches!(err, RenderError::MissingCapability(_)));
    }

    #[test]
    fn test_all_features_grant_all_optional_states() {
        let caps = negotiate(&DeviceFeatures::all()).unwrap();
        assert!(caps.supports(
            DynamicStateSet::PRIMITIVE_TOPOLOGY
                | DynamicStateSet::PRIMITIVE_RESTART_ENABLE
                | DynamicStateSet::RASTERIZER_DISCARD_ENABLE
                | DynamicStateSet::DEPTH_BIAS_ENABLE
        ));
    }

    #[test]
    fn test_optional_features_degrade_individually() {
        let features = DeviceFeatures {
            dynamic_primitive_topology: false,
            ..DeviceFeatures::all()
        };
        let caps = negotiate(&features).unwrap();
        assert!(!caps.supports(DynamicStateSet::PRIMITIVE_TOPOLOGY));
        assert!(caps.supports(DynamicStateSet::DEPTH_BIAS_ENABLE));
    }

    #[test]
    fn test_logic_op_only_grants_nothing_optional() {
        let caps = negotiate(&DeviceFeatures::logic_op_only()).unwrap();
        assert_eq!(caps.optional_states(), DynamicStateSet::empty());
    }
}
