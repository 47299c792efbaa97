use crate::common::{create_subnet, generate_pool, list_addresses, TestServer};

#[tokio::test]
async fn test_concurrent_assigns_have_exactly_one_winner() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    let subnet = create_subnet(&client, &server.url(), "10.50.0.0/28", "contended").await;
    generate_pool(&client, &server.url(), &subnet.id, false).await;

    let available = list_addresses(&client, &server.url(), &subnet.id, Some("available")).await;
    let target_id = available[0].id.clone();

    // 10 customers race for the same address
    let mut handles = Vec::new();
    for i in 0..10 {
        let url = format!("{}/api/ip-addresses/{}/assign", server.url(), target_id);
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .post(&url)
                .json(&serde_json::json!({
                    "customer_id": format!("cust-{}", i),
                    "service_id": format!("svc-{}", i),
                }))
                .send()
                .await
                .expect("Failed to send assign")
                .status()
                .as_u16()
        }));
    }

    let statuses: Vec<u16> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("Task panicked"))
        .collect();

    let winners = statuses.iter().filter(|s| **s == 200).count();
    let conflicts = statuses.iter().filter(|s| **s == 409).count();
    assert_eq!(winners, 1, "exactly one assign should win, got {:?}", statuses);
    assert_eq!(conflicts, 9);

    // Exactly one binding in the pool
    let assigned = list_addresses(&client, &server.url(), &subnet.id, Some("assigned")).await;
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].id, target_id);
}

#[tokio::test]
async fn test_concurrent_creates_never_overlap() {
    let server = TestServer::new().await;
    let client = reqwest::Client::new();

    // 8 concurrent attempts to claim the same /24
    let mut handles = Vec::new();
    for i in 0..8 {
        let url = format!("{}/api/subnets", server.url());
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .post(&url)
                .json(&serde_json::json!({
                    "router_id": format!("router-{}", i),
                    "cidr": "10.51.0.0/24",
                    "kind": "private",
                }))
                .send()
                .await
                .expect("Failed to send create")
                .status()
                .as_u16()
        }));
    }

    let statuses: Vec<u16> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.expect("Task panicked"))
        .collect();

    let created = statuses.iter().filter(|s| **s == 201).count();
    assert_eq!(created, 1, "only one create may land, got {:?}", statuses);
    assert!(statuses.iter().all(|s| *s == 201 || *s == 409));
}
