//! Kubernetes API client and Istio mesh resource reconcilers

mod client;
mod gateway;
mod retry;
mod virtualservice;

pub use client::K8sClient;
pub use gateway::{Gateway, GatewayReconciler, GatewaySpec, GatewayStatus, ObservedGateway};
pub(crate) use gateway::build_gateway_spec;
pub use retry::apply_with_retry;
pub use virtualservice::{
    ObservedVirtualService, VirtualService, VirtualServiceReconciler, VirtualServiceSpec,
    VirtualServiceStatus, SUSPENDED_LABEL,
};
pub(crate) use virtualservice::{build_http_route, build_virtual_service_spec, suspended_route};
