use super::{parse_timestamp, string_field, IntegrationItem};
use crate::oauth::{ClientAuth, ProviderDescriptor, ResourceEndpoint, ResourceMethod, TokenBody};
use serde_json::Value;

pub static HUBSPOT: ProviderDescriptor = ProviderDescriptor {
    name: "hubspot",
    display_name: "HubSpot",
    auth_url: "https://app.hubspot.com/oauth/authorize",
    token_url: "https://api.hubapi.com/oauth/v1/token",
    api_base: "https://api.hubapi.com",
    client_auth: ClientAuth::RequestBody,
    token_body: TokenBody::Form,
    pkce: false,
    auth_params: &[],
    api_headers: &[],
    resources: &[ResourceEndpoint {
        method: ResourceMethod::Get,
        path: "/crm/v3/objects/companies",
        results_field: "results",
    }],
    normalize: company_to_item,
};

/// HubSpot CRM company (or contact) record to an item.
///
/// Name falls back from `name` to `company` to "firstname lastname".
fn company_to_item(record: &Value) -> IntegrationItem {
    let properties = &record["properties"];

    let name = string_field(&properties["name"])
        .or_else(|| string_field(&properties["company"]))
        .or_else(|| {
            let first = properties["firstname"].as_str().unwrap_or_default();
            let last = properties["lastname"].as_str().unwrap_or_default();
            let full = format!("{} {}", first, last).trim().to_string();
            (!full.is_empty()).then_some(full)
        });

    IntegrationItem {
        id: string_field(&record["id"]),
        item_type: Some("HubSpot Company".to_string()),
        name,
        creation_time: parse_timestamp(&record["createdAt"]),
        last_modified_time: parse_timestamp(&record["updatedAt"]),
        ..Default::default()
    }
}
