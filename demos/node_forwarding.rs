//! Forwards a chat request to a registered node and prints which node
//! actually served it. Run a stub node locally (anything answering
//! `POST /chat` with `{"node_slug": "...", "message": "...", "sources": []}`)
//! and point `NODE_URL` at it to see this succeed end to end.
use node_federation::{
    BreakerRegistry, ChatOptions, CollectionClaim, HttpClient, InMemoryNodeStore, Node,
    NodeForwarder, NodeRegistry, TokenSigner,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base_url = std::env::var("NODE_URL").unwrap_or_else(|_| "http://127.0.0.1:4000".to_string());

    let invoicing = Node::new("invoicing", base_url, vec![CollectionClaim::simple("invoices")]);

    let store = Arc::new(InMemoryNodeStore::new(vec![invoicing.clone()]));
    let registry = Arc::new(NodeRegistry::new(store, Duration::from_secs(30)));
    let breakers = BreakerRegistry::new(5, Duration::from_secs(30), 1);
    let signer = TokenSigner::new(b"demo-secret".to_vec(), Duration::from_secs(3600));
    let http = Arc::new(HttpClient::new(Duration::from_secs(5), signer));
    let forwarder = NodeForwarder::new(registry, breakers, http);

    let outcome = forwarder
        .forward_chat(&invoicing, "What's the status of invoice 1042?", "demo-session", &ChatOptions::default(), Some("invoices"))
        .await?;

    println!("served by: {}", outcome.served_by);
    println!("response: {}", outcome.result.message);
    Ok(())
}
