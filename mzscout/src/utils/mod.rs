mod rounding;

pub use rounding::{
    round2,
    round4,
};
