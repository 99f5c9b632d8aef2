mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use common::{acquire_db_lock, body_json, today, Part, TestApp};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
struct WorkflowBody {
    document: DocumentBody,
    movement: MovementBody,
    attachments: Vec<AttachmentBody>,
}

#[derive(Deserialize)]
struct DocumentBody {
    status: String,
    id_office_destination: Option<Uuid>,
    user_id: Option<Uuid>,
}

#[derive(Deserialize)]
struct MovementBody {
    id: Uuid,
    sequence_number: i32,
    origin_office_id: Uuid,
    destination_office_id: Option<Uuid>,
    destination_user_id: Option<Uuid>,
    action: String,
    status: String,
    observation: Option<String>,
    receipt_date: Option<String>,
}

#[derive(Deserialize)]
struct AttachmentBody {
    path: String,
    filename: String,
}

#[derive(Deserialize)]
struct DetailBody {
    movements: Vec<MovementBody>,
}

struct Fixture {
    app: TestApp,
    office_a: Uuid,
    office_b: Uuid,
    user_x: Uuid,
    user_y: Uuid,
    document: Uuid,
}

async fn fixture() -> Result<Option<Fixture>> {
    let Some(app) = TestApp::try_new().await? else {
        return Ok(None);
    };
    let office_a = app.insert_office("MDP", None, true).await?;
    let office_b = app.insert_office("LEG", None, true).await?;
    let user_x = app.insert_user("Ana Torres", Some(office_a), true).await?;
    let user_y = app.insert_user("Luis Vega", Some(office_b), true).await?;
    let document = app.insert_document(office_a).await?;
    Ok(Some(Fixture {
        app,
        office_a,
        office_b,
        user_x,
        user_y,
        document,
    }))
}

async fn forward(fx: &Fixture, destination: Uuid, user: Option<Uuid>) -> Result<WorkflowBody> {
    let response = fx
        .app
        .post_json(
            &format!("/api/documents/{}/forward", fx.document),
            &json!({
                "destination_office_id": destination,
                "destination_user_id": user,
                "indication": "review",
                "receipt_date": today(),
            }),
            Some(fx.user_x),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn forward_respond_then_rejected_reject() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(fx) = fixture().await? else {
        return Ok(());
    };

    let forwarded = forward(&fx, fx.office_b, None).await?;
    assert_eq!(forwarded.document.status, "IN_PROCESS");
    assert_eq!(forwarded.document.id_office_destination, Some(fx.office_b));
    assert_eq!(forwarded.movement.action, "DERIVACION");
    assert_eq!(forwarded.movement.status, "PENDING");
    assert_eq!(forwarded.movement.sequence_number, 1);
    assert_eq!(forwarded.movement.origin_office_id, fx.office_a);
    assert_eq!(forwarded.movement.receipt_date, Some(today().to_string()));
    assert_eq!(fx.app.movement_count(fx.document).await?, 1);

    let response = fx
        .app
        .multipart(
            Method::POST,
            &format!("/api/movements/{}/respond", forwarded.movement.id),
            &[
                Part::Text("destination_office_id", &fx.office_a.to_string()),
                Part::Text("destination_user_id", &fx.user_x.to_string()),
                Part::Text("observation", "Completed as requested"),
            ],
            Some(fx.user_y),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let responded: WorkflowBody = body_json(response).await?;
    assert_eq!(responded.document.status, "COMPLETED");
    assert_eq!(responded.document.id_office_destination, Some(fx.office_a));
    assert_eq!(responded.movement.action, "RESPUESTA");
    assert_eq!(responded.movement.status, "COMPLETED");
    assert_eq!(responded.movement.origin_office_id, fx.office_b);
    assert!(responded.attachments.is_empty());
    assert!(fx.app.file_paths(fx.document).await?.is_empty());
    assert_eq!(fx.app.movement_count(fx.document).await?, 2);

    let response = fx
        .app
        .post_json(
            &format!("/api/movements/{}/reject", responded.movement.id),
            &json!({ "observation": "" }),
            Some(fx.user_x),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(fx.app.movement_count(fx.document).await?, 2);
    assert_eq!(
        fx.app.document_status(fx.document).await?.as_str(),
        "COMPLETED"
    );

    Ok(())
}

#[tokio::test]
async fn target_status_ignores_history_and_terminal_moves_clear_destinations() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(fx) = fixture().await? else {
        return Ok(());
    };

    let forwarded = forward(&fx, fx.office_b, Some(fx.user_y)).await?;
    assert_eq!(forwarded.document.user_id, Some(fx.user_y));
    assert_eq!(forwarded.movement.destination_user_id, Some(fx.user_y));

    let response = fx
        .app
        .post_json(
            &format!("/api/movements/{}/reject", forwarded.movement.id),
            &json!({ "observation": "missing signature" }),
            Some(fx.user_y),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let rejected: WorkflowBody = body_json(response).await?;
    assert_eq!(rejected.document.status, "REJECTED");
    assert_eq!(rejected.movement.action, "RECHAZADO");
    assert_eq!(rejected.movement.status, "REJECTED");
    assert_eq!(rejected.movement.destination_office_id, None);
    assert_eq!(rejected.movement.destination_user_id, None);

    let response = fx
        .app
        .post_json(
            &format!("/api/movements/{}/archive", rejected.movement.id),
            &json!({}),
            Some(fx.user_y),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let archived: WorkflowBody = body_json(response).await?;
    assert_eq!(archived.document.status, "ARCHIVED");
    assert_eq!(archived.movement.action, "ARCHIVADO");
    assert_eq!(archived.movement.status, "COMPLETED");
    assert_eq!(
        archived.movement.observation.as_deref(),
        Some("Documento archivado")
    );
    assert_eq!(archived.movement.destination_office_id, None);

    let reopened = forward(&fx, fx.office_a, None).await?;
    assert_eq!(reopened.document.status, "IN_PROCESS");
    assert_eq!(reopened.document.id_office_destination, Some(fx.office_a));
    assert_eq!(reopened.document.user_id, Some(fx.user_y));
    assert_eq!(reopened.movement.destination_user_id, None);

    let response = fx
        .app
        .get(&format!("/api/documents/{}", fx.document), Some(fx.user_x))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let detail: DetailBody = body_json(response).await?;
    let sequence: Vec<i32> = detail.movements.iter().map(|m| m.sequence_number).collect();
    assert_eq!(sequence, vec![1, 2, 3, 4]);
    let actions: Vec<&str> = detail.movements.iter().map(|m| m.action.as_str()).collect();
    assert_eq!(actions, vec!["DERIVACION", "RECHAZADO", "ARCHIVADO", "DERIVACION"]);

    Ok(())
}

#[tokio::test]
async fn failed_commands_append_nothing() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let closed = fx.app.insert_office("ARCH", None, false).await?;
    let path = format!("/api/documents/{}/forward", fx.document);

    let inactive = fx
        .app
        .post_json(
            &path,
            &json!({ "destination_office_id": closed, "receipt_date": today() }),
            Some(fx.user_x),
        )
        .await?;
    assert_eq!(inactive.status(), StatusCode::BAD_REQUEST);

    let no_date = fx
        .app
        .post_json(
            &path,
            &json!({ "destination_office_id": fx.office_b }),
            Some(fx.user_x),
        )
        .await?;
    assert_eq!(no_date.status(), StatusCode::BAD_REQUEST);

    let unknown = fx
        .app
        .post_json(
            &path,
            &json!({ "destination_office_id": Uuid::new_v4(), "receipt_date": today() }),
            Some(fx.user_x),
        )
        .await?;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let foreign_user = fx
        .app
        .post_json(
            &path,
            &json!({
                "destination_office_id": fx.office_b,
                "destination_user_id": fx.user_x,
                "receipt_date": today(),
            }),
            Some(fx.user_x),
        )
        .await?;
    assert_eq!(foreign_user.status(), StatusCode::BAD_REQUEST);

    let missing_movement = fx
        .app
        .post_json(
            &format!("/api/movements/{}/archive", Uuid::new_v4()),
            &json!({}),
            Some(fx.user_x),
        )
        .await?;
    assert_eq!(missing_movement.status(), StatusCode::NOT_FOUND);

    assert_eq!(fx.app.movement_count(fx.document).await?, 0);
    assert_eq!(
        fx.app.document_status(fx.document).await?.as_str(),
        "IN_PROCESS"
    );
    Ok(())
}

#[tokio::test]
async fn respond_requires_observation() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let forwarded = forward(&fx, fx.office_b, None).await?;

    let response = fx
        .app
        .multipart(
            Method::POST,
            &format!("/api/movements/{}/respond", forwarded.movement.id),
            &[
                Part::Text("destination_office_id", &fx.office_a.to_string()),
                Part::Text("destination_user_id", &fx.user_x.to_string()),
            ],
            Some(fx.user_y),
        )
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(fx.app.movement_count(fx.document).await?, 1);
    Ok(())
}

#[tokio::test]
async fn respond_attaches_files_under_responses_directory() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let forwarded = forward(&fx, fx.office_b, None).await?;

    let response = fx
        .app
        .multipart(
            Method::POST,
            &format!("/api/movements/{}/respond", forwarded.movement.id),
            &[
                Part::Text("destination_office_id", &fx.office_a.to_string()),
                Part::Text("destination_user_id", &fx.user_x.to_string()),
                Part::Text("observation", "Informe adjunto"),
                Part::File {
                    name: "file",
                    filename: "informe.pdf",
                    content_type: "application/pdf",
                    data: b"%PDF-1.4 informe",
                },
            ],
            Some(fx.user_y),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let responded: WorkflowBody = body_json(response).await?;

    assert_eq!(responded.attachments.len(), 1);
    let attachment = &responded.attachments[0];
    assert_eq!(attachment.filename, "informe.pdf");
    assert!(attachment.path.starts_with("document-responses/"));
    assert!(fx.app.storage().contains(&attachment.path).await);
    assert_eq!(fx.app.file_paths(fx.document).await?, vec![attachment.path.clone()]);
    Ok(())
}

#[tokio::test]
async fn rolled_back_respond_removes_staged_upload() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let forwarded = forward(&fx, fx.office_b, None).await?;
    let storage = fx.app.storage();
    let objects_before = storage.object_count().await;

    let response = fx
        .app
        .multipart(
            Method::POST,
            &format!("/api/movements/{}/respond", forwarded.movement.id),
            &[
                Part::Text("destination_office_id", &fx.office_a.to_string()),
                // belongs to office B, not the destination
                Part::Text("destination_user_id", &fx.user_y.to_string()),
                Part::Text("observation", "Informe adjunto"),
                Part::File {
                    name: "file",
                    filename: "informe.pdf",
                    content_type: "application/pdf",
                    data: b"%PDF-1.4 informe",
                },
            ],
            Some(fx.user_y),
        )
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(storage.object_count().await, objects_before);
    assert!(fx.app.file_paths(fx.document).await?.is_empty());
    assert_eq!(fx.app.movement_count(fx.document).await?, 1);
    assert_eq!(
        fx.app.document_status(fx.document).await?.as_str(),
        "IN_PROCESS"
    );
    Ok(())
}

#[tokio::test]
async fn requests_need_an_active_acting_user() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let retired = fx.app.insert_user("Former clerk", Some(fx.office_a), false).await?;

    for user in [None, Some(Uuid::new_v4()), Some(retired)] {
        let response = fx.app.get("/api/documents", user).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let health = fx.app.get("/api/health", None).await?;
    assert_eq!(health.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn inbox_lists_movements_for_acting_office() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(fx) = fixture().await? else {
        return Ok(());
    };
    let forwarded = forward(&fx, fx.office_b, None).await?;

    #[derive(Deserialize)]
    struct InboxEntry {
        id: Uuid,
    }

    let inbox: Vec<InboxEntry> = body_json(fx.app.get("/api/movements", Some(fx.user_y)).await?).await?;
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].id, forwarded.movement.id);

    let empty: Vec<InboxEntry> = body_json(fx.app.get("/api/movements", Some(fx.user_x)).await?).await?;
    assert!(empty.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_forwards_commit_whole_movements_in_sequence() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(fx) = fixture().await? else {
        return Ok(());
    };

    let path = format!("/api/documents/{}/forward", fx.document);
    let mut handles = Vec::new();
    for destination in [fx.office_b, fx.office_a, fx.office_b] {
        let app = fx.app.clone();
        let path = path.clone();
        let user = fx.user_x;
        handles.push(tokio::spawn(async move {
            let payload = json!({
                "destination_office_id": destination,
                "receipt_date": today(),
            });
            let response = app.post_json(&path, &payload, Some(user)).await?;
            anyhow::Ok(response.status())
        }));
    }

    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await??);
    }

    assert!(statuses
        .iter()
        .all(|status| *status == StatusCode::OK || *status == StatusCode::INTERNAL_SERVER_ERROR));
    let committed = statuses.iter().filter(|status| **status == StatusCode::OK).count();
    assert!(committed >= 1);
    assert_eq!(fx.app.movement_count(fx.document).await?, committed as i64);
    let expected: Vec<i32> = (1..=committed as i32).collect();
    assert_eq!(fx.app.movement_sequences(fx.document).await?, expected);
    assert_eq!(
        fx.app.document_status(fx.document).await?.as_str(),
        "IN_PROCESS"
    );
    Ok(())
}
