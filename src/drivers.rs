//! Device drivers implementing [`LightDevice`](crate::light::LightDevice).

pub mod elgato;
