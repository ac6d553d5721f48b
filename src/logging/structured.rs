//! Structured logging utilities.
//!
//! Every line reads `<context> EVENT_NAME key=value ...`.

use std::fmt;

use uuid::Uuid;

/// Logging context for one transformation request or registry operation.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub request_id: String,
    pub provider: Option<String>,
    pub rule_type: Option<String>,
}

impl LogContext {
    pub fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            provider: None,
            rule_type: None,
        }
    }

    /// Context with a freshly generated short request id.
    pub fn generate(prefix: &str) -> Self {
        Self::new(&format!("{}-{}", prefix, &Uuid::new_v4().simple().to_string()[..8]))
    }

    pub fn with_provider(&self, provider: &str) -> Self {
        Self {
            provider: Some(provider.to_string()),
            ..self.clone()
        }
    }

    pub fn with_rule_type(&self, rule_type: &str) -> Self {
        Self {
            rule_type: Some(rule_type.to_string()),
            ..self.clone()
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[req={}]", self.request_id)?;
        if let Some(provider) = &self.provider {
            write!(f, " [provider={}]", provider)?;
        }
        if let Some(rule_type) = &self.rule_type {
            write!(f, " [type={}]", rule_type)?;
        }
        Ok(())
    }
}

/// Render one `<context> EVENT key=value ...` line. Values use their
/// `Debug` form, so strings are quoted.
#[macro_export]
macro_rules! format_event {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        format!(
            concat!("{} {}", $(" ", stringify!($key), "={:?}"),*),
            $ctx,
            $event
            $(, $value)*
        )
    };
}

/// Log an info message with context.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::info!("{}", $crate::format_event!($ctx, $event $(, $key = $value)*))
    };
}

/// Log a warning message with context.
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::warn!("{}", $crate::format_event!($ctx, $event $(, $key = $value)*))
    };
}

/// Log an error message with context.
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::error!("{}", $crate::format_event!($ctx, $event $(, $key = $value)*))
    };
}

/// Log a debug message with context.
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::debug!("{}", $crate::format_event!($ctx, $event $(, $key = $value)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_context_display() {
        let ctx = LogContext::new("req-123");
        assert_eq!(format!("{}", ctx), "[req=req-123]");

        let scoped = ctx.with_provider("longport").with_rule_type("quote_fields");
        assert_eq!(
            format!("{}", scoped),
            "[req=req-123] [provider=longport] [type=quote_fields]"
        );
    }

    #[test]
    fn test_generated_ids_are_prefixed() {
        let ctx = LogContext::generate("warmup");
        assert!(ctx.request_id.starts_with("warmup-"));
        assert_eq!(ctx.request_id.len(), "warmup-".len() + 8);
    }

    #[test]
    fn test_event_line_shape() {
        let ctx = LogContext::new("create-1a2b3c4d")
            .with_provider("longport")
            .with_rule_type("quote_fields");
        let error = String::from("connection refused");
        assert_eq!(
            crate::format_event!(ctx, "RULE_CACHE_FILL_FAILED", id = "r1", error = error),
            "[req=create-1a2b3c4d] [provider=longport] [type=quote_fields] \
             RULE_CACHE_FILL_FAILED id=\"r1\" error=\"connection refused\""
        );
        assert_eq!(
            crate::format_event!(ctx, "DEFAULT_CLEARED", count = 1usize,),
            "[req=create-1a2b3c4d] [provider=longport] [type=quote_fields] DEFAULT_CLEARED count=1"
        );
    }

    #[test]
    fn test_macros_expand() {
        let ctx = LogContext::new("req-1");
        crate::log_info!(ctx, "TEST_EVENT", count = 3, name = "x");
        crate::log_warn!(ctx, "TEST_EVENT");
        crate::log_debug!(&ctx, "TEST_EVENT", ok = true);
        crate::log_error!(ctx, "TEST_EVENT", reason = "none",);
    }
}
