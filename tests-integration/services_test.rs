//! Sites, employees, hours, schedules, deadlines and the HTTP routes.
//!
//! Requires `TEST_DATABASE_URL`; every test is a no-op without it.

mod common;

use cantiere::employees::{create_employee, NewEmployee};
use cantiere::http::{handle, ApiRequest};
use cantiere::schedules::{
    add_to_schedule, assign, calendar, move_schedule, unassign, CalendarRange, ScheduleMove,
    ScheduleRequest,
};
use chrono::NaiveDate;
use cantiere::sites::{create_site, NewSite};
use cantiere::{deadlines, hours, DbExecutor, ServiceError};
use common::{require_db, unique};
use rust_decimal::Decimal;
use serde_json::{json, Value};

fn site(conn: &dyn DbExecutor) -> i64 {
    let new_site: NewSite =
        serde_json::from_value(json!({ "nome": unique("Cantiere"), "indirizzo": "Via Roma 1" }))
            .expect("site json");
    create_site(conn, &new_site.validate().expect("valid site"))
        .expect("create site")
        .id
}

fn employee(conn: &dyn DbExecutor) -> i64 {
    let new_employee: NewEmployee = serde_json::from_value(json!({
        "nomeCompleto": "Mario Rossi",
        "username": unique("mrossi"),
        "password": "segreta",
    }))
    .expect("employee json");
    create_employee(conn, &new_employee.validate().expect("valid employee"))
        .expect("create employee")
        .id
}

#[test]
fn test_duplicate_username_is_conflict() {
    let db = require_db!();
    let conn = db.state.pool.acquire().expect("connection");
    let new_employee: NewEmployee = serde_json::from_value(json!({
        "nomeCompleto": "Luigi Bianchi",
        "username": unique("lbianchi"),
        "password": "pw",
    }))
    .expect("employee json");
    let new_employee = new_employee.validate().expect("valid");

    create_employee(&conn, &new_employee).expect("first insert");
    match create_employee(&conn, &new_employee) {
        Err(err @ ServiceError::Conflict(_)) => assert_eq!(err.status(), 409),
        other => panic!("expected Conflict, got {other:?}"),
    }

    let stored: String = conn
        .query_one(
            "SELECT password_hash FROM dipendenti WHERE username = $1",
            &[&new_employee.username],
        )
        .expect("row")
        .get(0);
    assert_ne!(stored, "pw");
    assert_eq!(stored.len(), 64);
}

#[test]
fn test_schedule_assignments() {
    let db = require_db!();
    let conn = db.state.pool.acquire().expect("connection");
    let site_a = site(&conn);
    let site_b = site(&conn);
    let first = employee(&conn);
    let second = employee(&conn);

    let request = |site_id: i64, employees: Vec<i64>| {
        let req: ScheduleRequest = serde_json::from_value(json!({
            "cantiereId": site_id,
            "data": "2031-03-04",
            "dipendenti": employees,
        }))
        .expect("schedule json");
        req.validate().expect("valid schedule")
    };

    let report = conn
        .transaction(|tx| assign(tx, &request(site_a, vec![first, second])))
        .expect("assign");
    assert_eq!(report.assigned, vec![first, second]);
    assert!(report.duplicates.is_empty() && report.conflicts.is_empty());

    let again = conn
        .transaction(|tx| assign(tx, &request(site_a, vec![first])))
        .expect("assign again");
    assert_eq!(again.schedule_id, report.schedule_id);
    assert_eq!(again.duplicates, vec![first]);

    let elsewhere = conn
        .transaction(|tx| assign(tx, &request(site_b, vec![first])))
        .expect("assign elsewhere");
    assert!(elsewhere.assigned.is_empty());
    assert_eq!(elsewhere.conflicts.len(), 1);
    assert_eq!(elsewhere.conflicts[0].site_id, site_a);

    let unknown = conn.transaction(|tx| assign(tx, &request(site_a, vec![i64::MAX - 3])));
    assert!(matches!(unknown, Err(ServiceError::NotFound(_))));

    unassign(&conn, report.schedule_id, second).expect("unassign");
    assert!(matches!(
        unassign(&conn, report.schedule_id, second),
        Err(ServiceError::NotFound(_))
    ));
}

#[test]
fn test_hours_summary() {
    let db = require_db!();
    let conn = db.state.pool.acquire().expect("connection");
    let site_id = site(&conn);
    let employee_id = employee(&conn);

    for (start, end) in [("07:30", "12:00"), ("13:00", "16:30")] {
        let entry: hours::NewHours = serde_json::from_value(json!({
            "dipendenteId": employee_id,
            "cantiereId": site_id,
            "data": "2031-03-05",
            "oraInizio": start,
            "oraFine": end,
        }))
        .expect("hours json");
        hours::create_hours(&conn, &entry.validate().expect("valid")).expect("insert hours");
    }

    let filter = hours::HoursFilter {
        employee_id: Some(employee_id),
        ..hours::HoursFilter::default()
    };
    let entries = hours::list_hours(&conn, &filter).expect("list hours");
    assert_eq!(entries.len(), 2);
    let summary = hours::summarize(&entries);
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].entries, 2);
    assert_eq!(summary[0].total_hours, Decimal::from(8));
}

#[test]
fn test_deadline_lifecycle() {
    let db = require_db!();
    let conn = db.state.pool.acquire().expect("connection");
    let new_deadline: deadlines::NewDeadline = serde_json::from_value(json!({
        "descrizione": unique("Fattura"),
        "importo": "320,50",
        "dataScadenza": "2031-04-30",
    }))
    .expect("deadline json");
    let created = deadlines::create_deadline(&conn, &new_deadline.validate().expect("valid"))
        .expect("create deadline");
    assert_eq!(created.status, deadlines::STATUS_DUE);

    deadlines::mark_paid(&conn, created.id).expect("mark paid");
    let paid = deadlines::list_deadlines(&conn)
        .expect("list")
        .into_iter()
        .find(|d| d.id == created.id)
        .expect("created deadline listed");
    assert_eq!(paid.status, deadlines::STATUS_PAID);

    assert!(matches!(
        deadlines::mark_paid(&conn, i64::MAX - 11),
        Err(ServiceError::NotFound(_))
    ));
}

fn call(db: &common::TestDatabase, method: &str, target: &str, body: Value) -> (u16, Value) {
    let raw = if body.is_null() {
        Vec::new()
    } else {
        body.to_string().into_bytes()
    };
    let rsp = handle(&db.state, &ApiRequest::new(method, target, raw));
    let json = serde_json::from_slice(&rsp.body).unwrap_or(Value::Null);
    (rsp.status, json)
}

#[test]
fn test_http_movement_flow() {
    let db = require_db!();

    let (status, created) = call(
        &db,
        "POST",
        "/magazzino/articoli",
        json!({ "nome": unique("Cemento"), "quantita": 10, "sogliaMinima": 4 }),
    );
    assert_eq!(status, 201);
    let id = created["id"].as_i64().expect("item id");

    let (status, moved) = call(
        &db,
        "POST",
        "/magazzino/movimenti",
        json!({ "articoloId": id, "tipo": "scarico", "quantita": "7" }),
    );
    assert_eq!(status, 201);
    assert_eq!(moved["nuovaQuantita"], json!(3.0));
    assert_eq!(moved["tipo"], "scarico");

    let (status, rejected) = call(
        &db,
        "POST",
        "/magazzino/movimenti",
        json!({ "articoloId": id, "tipo": "uscita", "quantita": 5 }),
    );
    assert_eq!(status, 400);
    assert!(rejected["message"].is_string());

    let (status, _) = call(
        &db,
        "POST",
        "/magazzino/movimenti",
        json!({ "articoloId": id, "tipo": "furto", "quantita": 1 }),
    );
    assert_eq!(status, 400);

    let missing = i64::MAX - 5;
    let (status, body) = call(
        &db,
        "POST",
        "/magazzino/movimenti",
        json!({ "articoloId": missing, "tipo": "carico", "quantita": 1 }),
    );
    assert_eq!(status, 404);
    assert!(body["message"].as_str().is_some_and(|m| m.contains(&missing.to_string())));

    let (status, _) = call(
        &db,
        "POST",
        "/magazzino/movimenti",
        json!({ "articoloId": id, "tipo": "carico", "quantita": "0.0001" }),
    );
    assert_eq!(status, 400);

    let (status, log) = call(&db, "GET", &format!("/magazzino/movimenti?articoloId={id}"), Value::Null);
    assert_eq!(status, 200);
    assert_eq!(log.as_array().map(Vec::len), Some(2));

    let (status, _) = call(&db, "GET", "/magazzino/kpi", Value::Null);
    assert_eq!(status, 200);
    let (status, body) = call(&db, "GET", "/nessuna/rotta", Value::Null);
    assert_eq!(status, 404);
    assert_eq!(body["message"], "Risorsa non trovata");
}

#[test]
fn test_http_legacy_post_upserts_by_name() {
    let db = require_db!();
    let name = unique("Sabbia");

    let (status, first) = call(
        &db,
        "POST",
        "/magazzino",
        json!({ "nome": name, "quantita": 4, "sogliaMinima": 2 }),
    );
    assert_eq!(status, 200);
    assert_eq!(first["action"], "inserted");
    let id = first["id"].as_i64().expect("item id");

    let (status, second) = call(
        &db,
        "POST",
        "/magazzino",
        json!({ "nome": name.to_uppercase(), "quantita": 6, "sogliaMinima": 1 }),
    );
    assert_eq!(status, 200);
    assert_eq!(second["action"], "updated");
    assert_eq!(second["id"], id);
    assert_eq!(second["quantita"], json!(10.0));

    let (_, items) = call(&db, "GET", "/magazzino/articoli", Value::Null);
    let item = items
        .as_array()
        .and_then(|items| items.iter().find(|i| i["id"] == id))
        .expect("upserted item listed")
        .clone();
    assert_eq!(item["quantita"], json!(10.0));
    // The threshold never decreases through the upsert
    assert_eq!(item["sogliaMinima"], json!(2.0));

    let (_, log) = call(&db, "GET", &format!("/magazzino/movimenti?articoloId={id}"), Value::Null);
    assert_eq!(log.as_array().map(Vec::len), Some(2));
}

#[test]
fn test_schedule_add_and_move() {
    let db = require_db!();
    let conn = db.state.pool.acquire().expect("connection");
    let site_a = site(&conn);
    let site_b = site(&conn);
    let site_c = site(&conn);
    let first = employee(&conn);
    let second = employee(&conn);
    let busy = employee(&conn);
    let day = |d| NaiveDate::from_ymd_opt(2032, 5, d).expect("date");

    let schedule = |site_id: i64, date: &str, employees: Vec<i64>| {
        let req: ScheduleRequest = serde_json::from_value(json!({
            "cantiereId": site_id,
            "data": date,
            "dipendenti": employees,
        }))
        .expect("schedule json");
        let req = req.validate().expect("valid schedule");
        conn.transaction(|tx| assign(tx, &req)).expect("assign")
    };

    let source = schedule(site_a, "2032-05-10", vec![first]);
    let added = conn
        .transaction(|tx| add_to_schedule(tx, source.schedule_id, &[first, second]))
        .expect("add");
    assert_eq!(added.assigned, vec![second]);
    assert_eq!(added.duplicates, vec![first]);
    assert!(matches!(
        conn.transaction(|tx| add_to_schedule(tx, i64::MAX - 9, &[first])),
        Err(ServiceError::NotFound(_))
    ));

    // `busy` works at site C on the target day, `second` is already at site B
    schedule(site_c, "2032-05-11", vec![busy]);
    let target = schedule(site_b, "2032-05-11", vec![second]);
    conn.transaction(|tx| add_to_schedule(tx, source.schedule_id, &[busy]))
        .expect("add busy");

    let moved = conn
        .transaction(|tx| {
            move_schedule(
                tx,
                source.schedule_id,
                &ScheduleMove {
                    site_id: Some(site_b),
                    date: Some(day(11)),
                },
            )
        })
        .expect("move");
    assert_eq!(moved.to, target.schedule_id);
    assert_eq!(moved.moved, vec![first]);
    assert_eq!(moved.skipped, vec![second]);
    assert_eq!(moved.conflicts.len(), 1);
    assert_eq!(moved.conflicts[0].employee_id, busy);
    assert!(!moved.source_deleted);

    let events = calendar(
        &conn,
        &CalendarRange {
            start: Some(day(10)),
            end: Some(day(11)),
        },
    )
    .expect("calendar");
    let source_event = events
        .iter()
        .find(|e| e.id == source.schedule_id)
        .expect("source still listed");
    assert_eq!(source_event.start, day(10));
    assert!(events.iter().any(|e| e.id == target.schedule_id));

    // Merging into the schedule `busy` is already on empties the source
    let emptied = conn
        .transaction(|tx| {
            move_schedule(
                tx,
                source.schedule_id,
                &ScheduleMove {
                    site_id: Some(site_c),
                    date: Some(day(11)),
                },
            )
        })
        .expect("second move");
    assert!(emptied.moved.is_empty());
    assert_eq!(emptied.skipped, vec![busy]);
    assert!(emptied.source_deleted);
    assert!(matches!(
        conn.transaction(|tx| move_schedule(tx, source.schedule_id, &ScheduleMove::default())),
        Err(ServiceError::NotFound(_))
    ));
}

#[test]
fn test_http_overview_and_calendar() {
    let db = require_db!();
    let (status, overview) = call(&db, "GET", "/overview", Value::Null);
    assert_eq!(status, 200);
    assert!(overview["cantieri"].is_i64());
    assert!(overview["pianificazioniOggi"].is_i64());

    let (status, events) = call(
        &db,
        "GET",
        "/pianificazioni/calendar?start=2032-01-01&end=2032-12-31",
        Value::Null,
    );
    assert_eq!(status, 200);
    assert!(events.is_array());

    let (status, _) = call(&db, "GET", "/pianificazioni/calendar?start=domani", Value::Null);
    assert_eq!(status, 400);
    let (status, _) = call(
        &db,
        "PATCH",
        &format!("/pianificazioni/{}/assegna", i64::MAX - 2),
        json!({ "dipendenti": [1] }),
    );
    assert_eq!(status, 404);
}
