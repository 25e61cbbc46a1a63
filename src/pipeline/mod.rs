pub mod compare;
pub mod detect;
pub mod mask;
pub mod registry;
pub mod request;
pub mod selector;
pub mod similarity;
pub mod transform;
pub mod workflow;
