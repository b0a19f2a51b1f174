use super::{string_field, IntegrationItem};
use crate::oauth::{ClientAuth, ProviderDescriptor, ResourceEndpoint, ResourceMethod, TokenBody};
use serde_json::Value;

/// Airtable requires PKCE on every authorization request.
pub static AIRTABLE: ProviderDescriptor = ProviderDescriptor {
    name: "airtable",
    display_name: "Airtable",
    auth_url: "https://airtable.com/oauth2/v1/authorize",
    token_url: "https://airtable.com/oauth2/v1/token",
    api_base: "https://api.airtable.com",
    client_auth: ClientAuth::BasicAuth,
    token_body: TokenBody::Form,
    pkce: true,
    auth_params: &[],
    api_headers: &[],
    resources: &[ResourceEndpoint {
        method: ResourceMethod::Get,
        path: "/v0/meta/bases",
        results_field: "bases",
    }],
    normalize: base_to_item,
};

fn base_to_item(record: &Value) -> IntegrationItem {
    let id = string_field(&record["id"]);

    IntegrationItem {
        url: id.as_ref().map(|id| format!("https://airtable.com/{}", id)),
        id,
        item_type: Some("Base".to_string()),
        name: string_field(&record["name"]),
        directory: true,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_to_item() {
        let record = json!({
            "id": "appLkNDICXNqxSDhG",
            "name": "Apartment Hunting",
            "permissionLevel": "create"
        });

        let item = base_to_item(&record);
        assert_eq!(item.id.as_deref(), Some("appLkNDICXNqxSDhG"));
        assert_eq!(item.name.as_deref(), Some("Apartment Hunting"));
        assert_eq!(item.item_type.as_deref(), Some("Base"));
        assert_eq!(
            item.url.as_deref(),
            Some("https://airtable.com/appLkNDICXNqxSDhG")
        );
        assert!(item.directory);
    }

    #[test]
    fn test_descriptor_requires_pkce() {
        assert!(AIRTABLE.pkce);
        assert_eq!(AIRTABLE.client_auth, ClientAuth::BasicAuth);
    }
}
