use uuid::Uuid;

/// Generates a process-scoped opaque identifier, stamped as a label on every
/// pod this process owns (spec §3 "Instance identity"). Mirrors the
/// original's `uuid.uuid4().hex`.
pub fn generate_instance_id() -> String {
    Uuid::new_v4().simple().to_string()
}
