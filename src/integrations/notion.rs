use super::{parse_timestamp, string_field, IntegrationItem};
use crate::oauth::{ClientAuth, ProviderDescriptor, ResourceEndpoint, ResourceMethod, TokenBody};
use serde_json::Value;

pub static NOTION: ProviderDescriptor = ProviderDescriptor {
    name: "notion",
    display_name: "Notion",
    auth_url: "https://api.notion.com/v1/oauth/authorize",
    token_url: "https://api.notion.com/v1/oauth/token",
    api_base: "https://api.notion.com",
    client_auth: ClientAuth::BasicAuth,
    token_body: TokenBody::Json,
    pkce: false,
    auth_params: &[("owner", "user")],
    api_headers: &[("Notion-Version", "2022-06-28")],
    resources: &[ResourceEndpoint {
        method: ResourceMethod::Post(r#"{"page_size":100}"#),
        path: "/v1/search",
        results_field: "results",
    }],
    normalize: object_to_item,
};

/// Notion page or database to an item.
fn object_to_item(record: &Value) -> IntegrationItem {
    let object = record["object"].as_str().unwrap_or("page");
    let parent = &record["parent"];
    let parent_id = parent["type"]
        .as_str()
        .filter(|t| *t != "workspace")
        .and_then(|t| string_field(&parent[t]));

    IntegrationItem {
        id: string_field(&record["id"]),
        item_type: Some(object.to_string()),
        name: title_of(record),
        parent_id,
        creation_time: parse_timestamp(&record["created_time"]),
        last_modified_time: parse_timestamp(&record["last_edited_time"]),
        url: string_field(&record["url"]),
        directory: object == "database",
        visibility: !record["archived"].as_bool().unwrap_or(false),
        ..Default::default()
    }
}

/// Databases carry a top-level `title`; pages keep it in their title-typed property.
fn title_of(record: &Value) -> Option<String> {
    let rich_text = match &record["title"] {
        Value::Array(_) => &record["title"],
        _ => record["properties"]
            .as_object()?
            .values()
            .find(|p| p["type"] == "title")
            .map(|p| &p["title"])?,
    };

    let text: String = rich_text
        .as_array()?
        .iter()
        .filter_map(|t| t["plain_text"].as_str())
        .collect();

    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_to_item() {
        let record = json!({
            "object": "page",
            "id": "59833787-2cf9-4fdf-8782-e53db20768a5",
            "created_time": "2022-03-01T19:05:00.000Z",
            "last_edited_time": "2022-07-06T20:25:00.000Z",
            "archived": false,
            "parent": {"type": "database_id", "database_id": "d9824bdc-8445-4327-be8b-5b47500af6ce"},
            "url": "https://www.notion.so/Tuscan-kale-598337872cf94fdf8782e53db20768a5",
            "properties": {
                "Name": {
                    "id": "title",
                    "type": "title",
                    "title": [
                        {"type": "text", "plain_text": "Tuscan "},
                        {"type": "text", "plain_text": "kale"}
                    ]
                }
            }
        });

        let item = object_to_item(&record);
        assert_eq!(item.item_type.as_deref(), Some("page"));
        assert_eq!(item.name.as_deref(), Some("Tuscan kale"));
        assert_eq!(
            item.parent_id.as_deref(),
            Some("d9824bdc-8445-4327-be8b-5b47500af6ce")
        );
        assert!(item.url.unwrap().starts_with("https://www.notion.so/"));
        assert!(!item.directory);
        assert!(item.visibility);
        assert!(item.creation_time.is_some());
    }

    #[test]
    fn test_database_to_item() {
        let record = json!({
            "object": "database",
            "id": "db1",
            "title": [{"plain_text": "Grocery list"}],
            "parent": {"type": "workspace", "workspace": true},
            "archived": true
        });

        let item = object_to_item(&record);
        assert_eq!(item.item_type.as_deref(), Some("database"));
        assert_eq!(item.name.as_deref(), Some("Grocery list"));
        assert_eq!(item.parent_id, None);
        assert!(item.directory);
        assert!(!item.visibility);
    }

    #[test]
    fn test_untitled_page() {
        let record = json!({"object": "page", "id": "p1", "properties": {}});
        assert_eq!(object_to_item(&record).name, None);
    }
}
