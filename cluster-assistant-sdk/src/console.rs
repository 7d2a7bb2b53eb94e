// ============================================================================
// Console Logging Macros (for the CLI)
// ============================================================================
// Colored, human-readable output. Structured diagnostics go through `tracing`
// in the application crate instead.
// ============================================================================

/// Logs an informational message.
///
/// # Example
/// ```
/// use cluster_assistant_sdk::log_info;
/// log_info!("Loading settings...");
/// ```
///
/// Outputs:
/// ```text
/// ℹ Loading settings...
/// ```
#[macro_export]
macro_rules! log_info {
    ($message:expr) => {
        println!("\x1b[36mℹ {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        println!("\x1b[36mℹ {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

/// Logs a warning message.
///
/// # Example
/// ```
/// use cluster_assistant_sdk::log_warning;
/// log_warning!("History is disabled");
/// ```
///
/// Outputs:
/// ```text
/// ⚠ Warning: History is disabled
/// ```
#[macro_export]
macro_rules! log_warning {
    ($message:expr) => {
        println!("\x1b[33m⚠ Warning: {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        println!("\x1b[33m⚠ Warning: {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

/// Logs one progress trail entry with a status marker.
///
/// # Example
/// ```
/// use cluster_assistant_sdk::{log_stage, ProgressEntry, ProgressStatus, Stage};
/// let entry = ProgressEntry {
///     stage_name: Stage::IpAllocation,
///     status: ProgressStatus::Completed,
///     message: "Allocated 5 addresses".to_string(),
///     timestamp: chrono::Utc::now(),
///     details: serde_json::Value::Null,
/// };
/// log_stage!(entry);
/// ```
///
/// Outputs:
/// ```text
///   ✓ [IP Allocation] Allocated 5 addresses
/// ```
#[macro_export]
macro_rules! log_stage {
    ($entry:expr) => {
        match $entry.status {
            $crate::ProgressStatus::Started => println!(
                "\x1b[36m  → [{}] {}\x1b[0m",
                $entry.stage_name.label(),
                $entry.message
            ),
            $crate::ProgressStatus::Completed => println!(
                "\x1b[32m  ✓ [{}] {}\x1b[0m",
                $entry.stage_name.label(),
                $entry.message
            ),
            $crate::ProgressStatus::Failed => println!(
                "\x1b[31m  ✗ [{}] {}\x1b[0m",
                $entry.stage_name.label(),
                $entry.message
            ),
        }
    };
}

// ============================================================================
// End of Console Logging Macros
// ============================================================================
