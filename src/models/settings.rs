use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub id: i32,
    pub site_name: String,
    pub default_currency: String,
    pub default_lot_size: f64,
    pub allow_registration: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSettingsInput {
    pub site_name: Option<String>,
    pub default_currency: Option<String>,
    pub default_lot_size: Option<f64>,
    pub allow_registration: Option<bool>,
}
