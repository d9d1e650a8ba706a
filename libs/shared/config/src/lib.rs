use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub supabase_service_role_key: String,
    pub supabase_storage_bucket: String,
    pub chat: ChatSettings,
    pub server_port: u16,
}

/// Tuning knobs for the real-time consultation chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSettings {
    pub outbound_queue_capacity: usize,
    pub room_queue_capacity: usize,
    pub max_message_length: usize,
    /// `None` keeps room sessions for the lifetime of the process.
    pub session_idle_timeout: Option<Duration>,
    pub max_upload_bytes: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 256,
            room_queue_capacity: 1024,
            max_message_length: 4000,
            session_idle_timeout: None,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = ChatSettings::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            supabase_storage_bucket: env::var("SUPABASE_STORAGE_BUCKET")
                .unwrap_or_else(|_| "consultations".to_string()),
            chat: ChatSettings {
                outbound_queue_capacity: parse_or("CHAT_OUTBOUND_QUEUE_CAPACITY", defaults.outbound_queue_capacity),
                room_queue_capacity: parse_or("CHAT_ROOM_QUEUE_CAPACITY", defaults.room_queue_capacity),
                max_message_length: parse_or("CHAT_MAX_MESSAGE_LENGTH", defaults.max_message_length),
                session_idle_timeout: env::var("CHAT_SESSION_IDLE_SECS")
                    .ok()
                    .and_then(|raw| match raw.parse::<u64>() {
                        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
                        _ => {
                            warn!("CHAT_SESSION_IDLE_SECS is not a positive integer, idle sessions are kept");
                            None
                        }
                    }),
                max_upload_bytes: parse_or("CHAT_MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            },
            server_port: parse_or("SERVER_PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    /// Server-side writes (messages persisted by room sessions) need the service role key.
    pub fn is_persistence_configured(&self) -> bool {
        self.is_configured() && !self.supabase_service_role_key.is_empty()
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
