use crate::errors::AppError;

const DEFAULT_CSV_LINK_TTL_SECS: i64 = 3600;
const DEFAULT_GRID_MAX_LIMIT: i64 = 500;

/// Runtime knobs read from the environment (see `.env`).
#[derive(Debug, Clone)]
pub struct Settings {
    /// Lifetime of an issued CSV export link.
    pub csv_link_ttl_secs: i64,
    /// Upper bound for `limit` on grid and list queries.
    pub grid_max_limit: i64,
    /// Prefix used when building absolute CSV link URLs. Relative when unset.
    pub public_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            csv_link_ttl_secs: DEFAULT_CSV_LINK_TTL_SECS,
            grid_max_limit: DEFAULT_GRID_MAX_LIMIT,
            public_base_url: String::new(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let csv_link_ttl_secs = read_i64("CSV_LINK_TTL_SECS", defaults.csv_link_ttl_secs)?;
        if csv_link_ttl_secs <= 0 {
            return Err(AppError::configuration("CSV_LINK_TTL_SECS must be positive"));
        }

        let grid_max_limit = read_i64("GRID_MAX_LIMIT", defaults.grid_max_limit)?;
        if grid_max_limit <= 0 {
            return Err(AppError::configuration("GRID_MAX_LIMIT must be positive"));
        }

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_default();

        Ok(Self {
            csv_link_ttl_secs,
            grid_max_limit,
            public_base_url,
        })
    }
}

fn read_i64(name: &str, default: i64) -> Result<i64, AppError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| AppError::configuration(format!("{name} must be a valid integer"))),
        Err(_) => Ok(default),
    }
}

pub fn app_port() -> u16 {
    std::env::var("APP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8000)
}
