// Domain-layer modules and shared errors/models
pub mod geo {
    pub use crate::geo::*;
}

pub mod lead_scoring {
    pub use crate::lead_scoring::*;
}

pub mod customer_quality {
    pub use crate::customer_quality::*;
}

pub mod price_benchmark {
    pub use crate::price_benchmark::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod services {
    pub use crate::services::*;
}

pub mod errors {
    pub use crate::errors::*;
}
