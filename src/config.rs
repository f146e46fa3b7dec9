use std::str::FromStr;
use std::{env, fmt};

/// Which of the pipeline functions this binary runs as.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum FunctionMode {
    Collector,
    Processor,
}

impl FromStr for FunctionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "collector" | "generator" => Ok(FunctionMode::Collector),
            "processor" => Ok(FunctionMode::Processor),
            other => Err(format!("Invalid or Unsupported function mode {}", other)),
        }
    }
}

impl fmt::Display for FunctionMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FunctionMode {
    pub fn load_from_env() -> Result<FunctionMode, String> {
        env::var("FUNCTION_MODE")
            .unwrap_or("processor".to_string())
            .parse()
    }
}

/// Region recorded on metrics that do not carry one.
pub fn region_from_env() -> String {
    env::var("REGION")
        .or_else(|_| env::var("AWS_REGION"))
        .unwrap_or("eu-west-1".to_string())
}

pub fn ttl_days_from_env() -> Result<i64, String> {
    let ttl_days = env::var("TTL_DAYS")
        .unwrap_or("30".to_string())
        .parse::<i64>()
        .map_err(|e| format!("Error parsing TTL_DAYS to i64 - {}", e))?;
    if ttl_days <= 0 {
        return Err(format!("TTL_DAYS must be positive, got {}", ttl_days));
    }
    Ok(ttl_days)
}

pub fn flag_from_env(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
