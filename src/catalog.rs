//! Static model inventory for the cloud service.
//!
//! Plain configuration data consumed by the host application when it
//! assembles workflows; none of it participates in the job lifecycle.

use std::collections::HashMap;

/// Base model family a checkpoint or resource targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdVersion {
    Sd15,
    Sdxl,
    /// Usable with every base model.
    All,
}

impl SdVersion {
    pub fn as_str(&self) -> &str {
        match self {
            SdVersion::Sd15 => "sd15",
            SdVersion::Sdxl => "sdxl",
            SdVersion::All => "all",
        }
    }
}

/// Kind of auxiliary model resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Controlnet,
    IpAdapter,
    ClipVision,
    Lora,
    Upscaler,
    Inpaint,
}

/// Interpretation mode of a control layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlMode {
    Inpaint,
    Scribble,
    LineArt,
    SoftEdge,
    CannyEdge,
    Depth,
    Normal,
    Pose,
    Segmentation,
    Blur,
    Stencil,
    Hands,
    Reference,
    Face,
}

impl ControlMode {
    pub fn as_str(&self) -> &str {
        match self {
            ControlMode::Inpaint => "inpaint",
            ControlMode::Scribble => "scribble",
            ControlMode::LineArt => "line_art",
            ControlMode::SoftEdge => "soft_edge",
            ControlMode::CannyEdge => "canny_edge",
            ControlMode::Depth => "depth",
            ControlMode::Normal => "normal",
            ControlMode::Pose => "pose",
            ControlMode::Segmentation => "segmentation",
            ControlMode::Blur => "blur",
            ControlMode::Stencil => "stencil",
            ControlMode::Hands => "hands",
            ControlMode::Reference => "reference",
            ControlMode::Face => "face",
        }
    }
}

/// Key for the resource lookup table: `(kind, version, mode)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub version: SdVersion,
    pub identifier: String,
}

/// Build a [`ResourceId`] from a control mode.
pub fn resource_id(kind: ResourceKind, version: SdVersion, mode: ControlMode) -> ResourceId {
    ResourceId {
        kind,
        version,
        identifier: mode.as_str().to_string(),
    }
}

/// Build a [`ResourceId`] from a named (non-control) identifier.
pub fn named_resource_id(
    kind: ResourceKind,
    version: SdVersion,
    identifier: &str,
) -> ResourceId {
    ResourceId {
        kind,
        version,
        identifier: identifier.to_string(),
    }
}

/// A checkpoint installed on the service plus its base model family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointInfo {
    pub filename: String,
    pub version: SdVersion,
}

impl CheckpointInfo {
    fn new(filename: &str, version: SdVersion) -> Self {
        Self {
            filename: filename.to_string(),
            version,
        }
    }
}

/// Immutable model inventory exposed by the cloud service.
///
/// A resource mapped to `None` is known but not installed remotely.
#[derive(Debug, Clone, Default)]
pub struct ClientModels {
    pub checkpoints: HashMap<String, CheckpointInfo>,
    pub vae: Vec<String>,
    pub loras: Vec<String>,
    pub upscalers: Vec<String>,
    pub resources: HashMap<ResourceId, Option<String>>,
}

impl ClientModels {
    /// File name of an installed resource, if the service has one for this key.
    pub fn find_resource(&self, id: &ResourceId) -> Option<&str> {
        self.resources.get(id).and_then(|r| r.as_deref())
    }
}

/// Inventory of the models preinstalled on the cloud service.
pub fn cloud_models() -> ClientModels {
    use ControlMode::*;
    use ResourceKind::*;
    use SdVersion::*;

    let checkpoints = [
        CheckpointInfo::new("dreamshaper_8.safetensors", Sd15),
        CheckpointInfo::new("realisticVisionV51_v51VAE.safetensors", Sd15),
        CheckpointInfo::new("flat2DAnimerge_v45Sharp.safetensors", Sd15),
        CheckpointInfo::new("juggernautXL_version6Rundiffusion.safetensors", Sdxl),
    ]
    .into_iter()
    .map(|c| (c.filename.clone(), c))
    .collect();

    let upscalers = [
        "4x_NMKD-Superscale-SP_178000_G.pth",
        "HAT_SRx4_ImageNet-pretrain.pth",
        "OmniSR_X2_DIV2K.safetensors",
        "OmniSR_X3_DIV2K.safetensors",
        "OmniSR_X4_DIV2K.safetensors",
    ]
    .into_iter()
    .map(str::to_string)
    .collect();

    let installed = |name: &str| Some(name.to_string());
    let resources = HashMap::from([
        (
            resource_id(Controlnet, Sd15, ControlMode::Inpaint),
            installed("control_v11p_sd15_inpaint_fp16.safetensors"),
        ),
        (
            resource_id(Controlnet, Sd15, Scribble),
            installed("control_lora_rank128_v11p_sd15_scribble_fp16.safetensors"),
        ),
        (
            resource_id(Controlnet, Sdxl, Scribble),
            installed("sai_xl_sketch_256lora.safetensors"),
        ),
        (
            resource_id(Controlnet, Sd15, LineArt),
            installed("control_v11p_sd15_lineart_fp16.safetensors"),
        ),
        (
            resource_id(Controlnet, Sdxl, LineArt),
            installed("sai_xl_sketch_256lora.safetensors"),
        ),
        (
            resource_id(Controlnet, Sd15, SoftEdge),
            installed("control_v11p_sd15_softedge_fp16.safetensors"),
        ),
        (
            resource_id(Controlnet, Sd15, CannyEdge),
            installed("control_v11p_sd15_canny_fp16.safetensors"),
        ),
        (
            resource_id(Controlnet, Sdxl, CannyEdge),
            installed("sai_xl_canny_256lora.safetensors"),
        ),
        (
            resource_id(Controlnet, Sd15, Depth),
            installed("control_lora_rank128_v11f1p_sd15_depth_fp16.safetensors"),
        ),
        (
            resource_id(Controlnet, Sdxl, Depth),
            installed("sai_xl_depth_256lora.safetensors"),
        ),
        (resource_id(Controlnet, Sd15, Normal), None),
        (
            resource_id(Controlnet, Sd15, Pose),
            installed("control_lora_rank128_v11p_sd15_openpose_fp16.safetensors"),
        ),
        (
            resource_id(Controlnet, Sdxl, Pose),
            installed("thibaud_xl_openpose_256lora.safetensors"),
        ),
        (resource_id(Controlnet, Sd15, Segmentation), None),
        (
            resource_id(Controlnet, Sd15, Blur),
            installed("control_lora_rank128_v11f1e_sd15_tile_fp16.safetensors"),
        ),
        (resource_id(Controlnet, Sd15, Stencil), None),
        (resource_id(Controlnet, Sd15, Hands), None),
        (resource_id(Controlnet, Sdxl, Hands), None),
        (
            resource_id(IpAdapter, Sd15, Reference),
            installed("ip-adapter_sd15.safetensors"),
        ),
        (
            resource_id(IpAdapter, Sdxl, Reference),
            installed("ip-adapter_sdxl_vit-h.safetensors"),
        ),
        (resource_id(IpAdapter, Sd15, Face), None),
        (resource_id(IpAdapter, Sdxl, Face), None),
        (
            named_resource_id(ClipVision, All, "ip_adapter"),
            installed("clip-vision_vit-h.safetensors"),
        ),
        (
            named_resource_id(Lora, Sd15, "lcm"),
            installed("lcm-lora-sdv1-5.safetensors"),
        ),
        (
            named_resource_id(Lora, Sdxl, "lcm"),
            installed("lcm-lora-sdxl.safetensors"),
        ),
        (resource_id(Lora, Sd15, Face), None),
        (resource_id(Lora, Sdxl, Face), None),
        (
            named_resource_id(ResourceKind::Inpaint, Sdxl, "fooocus_head"),
            installed("fooocus_inpaint_head.pth"),
        ),
        (
            named_resource_id(ResourceKind::Inpaint, Sdxl, "fooocus_patch"),
            installed("inpaint_v26.fooocus.patch"),
        ),
        (
            named_resource_id(ResourceKind::Inpaint, All, "default"),
            installed("MAT_Places512_G_fp16.safetensors"),
        ),
    ]);

    ClientModels {
        checkpoints,
        vae: Vec::new(),
        loras: Vec::new(),
        upscalers,
        resources,
    }
}
