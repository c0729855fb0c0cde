use thiserror::Error;

/// Caller misuse that the tracker always checks, in every build profile.
///
/// These indicate a binding-logic bug upstream and are surfaced as errors
/// instead of being swallowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("draw issued outside of an open render pass")]
    DrawOutsidePass,
    #[error("end_render_pass called without an open render pass")]
    PassNotOpen,
    #[error("draw issued without a bound shader program")]
    MissingShader,
    #[error("indexed draw issued without a bound index buffer")]
    MissingIndexBuffer,
    #[error("{resource} already updated this frame; one content update per frame is allowed")]
    FrameContract { resource: &'static str },
    #[error("vertex buffer slot out of range")]
    SlotOutOfRange,
}

/// Errors surfaced by the device layer.
#[derive(Debug, Error)]
pub enum GPUError {
    /// The native device rejected a resource operation. No partial state is
    /// left bound when this is returned.
    #[error("{op}: device rejected operation: {reason}")]
    DeviceRejected { op: &'static str, reason: String },

    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),

    /// The handle is stale or belongs to another context.
    #[error("invalid {0} handle")]
    InvalidHandle(&'static str),

    /// The resource is still referenced by a binding slot or a render
    /// target attachment and cannot be destroyed yet.
    #[error("{0} is still bound or attached and cannot be destroyed")]
    ResourceInUse(&'static str),
}

pub type Result<T, E = GPUError> = std::result::Result<T, E>;
