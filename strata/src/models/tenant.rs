use uuid::Uuid;

/// Namespace used for collections when no tenant is supplied.
pub const NIL_TENANT: Uuid = Uuid::nil();

/// Collapse an optional tenant into the namespace it is stored under.
pub fn tenant_or_nil(tenant_id: Option<Uuid>) -> Uuid {
    tenant_id.unwrap_or(NIL_TENANT)
}

/// Tenant UUID in the form accepted by collection names (dashes become underscores).
pub fn normalize_tenant(tenant_id: &Uuid) -> String {
    tenant_id.hyphenated().to_string().replace('-', "_")
}
