//! Route table and handlers.
//!
//! [`Route::resolve`] is pure so the table is testable without a database.
//! Older frontend paths (`/api/...`, `/cantieri/tutti`, `/ore/aggiungi`,
//! `/scadenze/aggiorna-stato/{id}`, ...) resolve to the same handlers as the
//! canonical ones. The bare `POST /magazzino` is the older upsert by name,
//! not a plain create.

use crate::deadlines::{self, NewDeadline};
use crate::employees::{self, NewEmployee};
use crate::error::ServiceError;
use crate::hours::{self, HoursFilter, NewHours};
use crate::http::request::ApiRequest;
use crate::http::response::ApiResponse;
use crate::http::state::AppState;
use crate::overview;
use crate::schedules::{self, AddEmployeesRequest, CalendarRange, MoveRequest, ScheduleRequest};
use crate::sites::{self, NewSite};
use crate::warehouse::{MovementFilter, MovementRequest};
use rust_decimal::prelude::ToPrimitive;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Health,
    Metrics,
    Ping,
    ListItems,
    CreateItem,
    UpsertItem,
    UpdateItem(i64),
    DeleteItem(i64),
    ListMovements,
    RecordMovement,
    LowStock,
    Kpi,
    ListSites,
    CreateSite,
    SiteNames,
    ListEmployees,
    CreateEmployee,
    ListHours,
    CreateHours,
    HoursSummary,
    ListSchedules,
    Schedule,
    Unassign { schedule_id: i64, employee_id: i64 },
    AddToSchedule(i64),
    MoveSchedule(i64),
    Calendar,
    ListDeadlines,
    CreateDeadline,
    MarkPaid(i64),
    Overview,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    NotFound,
    BadId(String),
}

fn parse_id(raw: &str) -> Result<i64, RouteError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| RouteError::BadId(raw.to_string()))
}

impl Route {
    /// Map a method and a path (without query string) to a route
    ///
    /// # Errors
    ///
    /// `RouteError::NotFound` for unknown paths, `RouteError::BadId` when an
    /// id segment is not a positive integer.
    pub fn resolve(method: &str, path: &str) -> Result<Route, RouteError> {
        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.first() == Some(&"dashboard") {
            segments.remove(0);
        }
        if segments.first() == Some(&"api") {
            segments.remove(0);
        }

        let route = match (method, segments.as_slice()) {
            ("GET", ["health"]) => Route::Health,
            ("GET", ["metrics"]) => Route::Metrics,
            ("GET", ["overview"]) => Route::Overview,

            ("GET", ["magazzino", "ping"]) => Route::Ping,
            ("GET", ["magazzino", "articoli"]) | ("GET", ["magazzino", "inventario"]) => {
                Route::ListItems
            }
            ("POST", ["magazzino", "articoli"]) => Route::CreateItem,
            ("POST", ["magazzino"]) => Route::UpsertItem,
            ("PUT", ["magazzino", "articoli", id]) => Route::UpdateItem(parse_id(id)?),
            ("DELETE", ["magazzino", "articoli", id]) => Route::DeleteItem(parse_id(id)?),
            ("GET", ["magazzino", "movimenti"]) => Route::ListMovements,
            ("POST", ["magazzino", "movimenti"]) => Route::RecordMovement,
            ("GET", ["magazzino", "sotto-soglia"]) => Route::LowStock,
            ("GET", ["magazzino", "kpi"]) => Route::Kpi,

            ("GET", ["cantieri"]) | ("GET", ["cantieri", "tutti"]) => Route::ListSites,
            ("POST", ["cantieri"]) | ("POST", ["cantieri", "aggiungi"]) => Route::CreateSite,
            ("GET", ["cantieri", "nomi"]) => Route::SiteNames,

            ("GET", ["dipendenti"]) | ("GET", ["dipendenti", "tutti"]) => Route::ListEmployees,
            ("POST", ["dipendenti"]) => Route::CreateEmployee,

            ("GET", ["ore"]) | ("GET", ["ore", "tutte"]) => Route::ListHours,
            ("POST", ["ore"]) | ("POST", ["ore", "aggiungi"]) => Route::CreateHours,
            ("GET", ["ore", "riepilogo"]) | ("GET", ["ore", "riepilogo-dipendenti"]) => {
                Route::HoursSummary
            }

            ("GET", ["pianificazioni"]) => Route::ListSchedules,
            ("GET", ["pianificazioni", "calendar" | "calendario"]) => Route::Calendar,
            ("POST", ["pianificazioni"]) | ("POST", ["pianifica"]) => Route::Schedule,
            ("DELETE", ["pianificazioni", schedule, "dipendenti" | "assegna", employee]) => {
                Route::Unassign {
                    schedule_id: parse_id(schedule)?,
                    employee_id: parse_id(employee)?,
                }
            }
            ("PATCH", ["pianificazioni", id, "assegna"]) => Route::AddToSchedule(parse_id(id)?),
            ("PATCH", ["pianificazioni", id, "move" | "sposta"]) => {
                Route::MoveSchedule(parse_id(id)?)
            }

            ("GET", ["scadenze"]) | ("GET", ["scadenze", "tutte"]) => Route::ListDeadlines,
            ("POST", ["scadenze"]) | ("POST", ["scadenze", "aggiungi"]) => Route::CreateDeadline,
            ("POST" | "PUT", ["scadenze", "aggiorna-stato", id]) => Route::MarkPaid(parse_id(id)?),
            ("POST" | "PUT", ["scadenze", id, "pagata"]) => Route::MarkPaid(parse_id(id)?),

            _ => return Err(RouteError::NotFound),
        };
        Ok(route)
    }
}

/// Resolve and run one request
pub fn handle(state: &AppState, req: &ApiRequest) -> ApiResponse {
    let route = match Route::resolve(&req.method, &req.path) {
        Ok(route) => route,
        Err(RouteError::NotFound) => return ApiResponse::not_found(),
        Err(RouteError::BadId(raw)) => {
            return ApiResponse::message(400, &format!("Id non valido: {raw}"))
        }
    };
    dispatch(state, route, req).unwrap_or_else(|err| ApiResponse::error(&err))
}

fn dispatch(state: &AppState, route: Route, req: &ApiRequest) -> Result<ApiResponse, ServiceError> {
    let warehouse = &state.warehouse;
    let rsp = match route {
        Route::Health => health(state),
        Route::Metrics => metrics_response(),
        Route::Ping => ApiResponse::json(
            200,
            &json!({ "ok": true, "at": chrono::Utc::now().to_rfc3339() }),
        ),

        Route::ListItems => ApiResponse::json(200, &warehouse.list_items()?),
        Route::CreateItem => ApiResponse::json(201, &warehouse.create_item(req.json()?)?),
        Route::UpsertItem => ApiResponse::json(200, &warehouse.upsert_item(req.json()?)?),
        Route::UpdateItem(id) => ApiResponse::json(200, &warehouse.update_item(id, req.json()?)?),
        Route::DeleteItem(id) => {
            warehouse.delete_item(id)?;
            ApiResponse::message(200, "Articolo eliminato")
        }
        Route::ListMovements => {
            let filter = MovementFilter::parse(
                req.query_param("articoloId"),
                req.query_param("from"),
                req.query_param("to"),
            )?;
            ApiResponse::json(200, &warehouse.list_movements(&filter)?)
        }
        Route::RecordMovement => {
            let cmd = req.json::<MovementRequest>()?.validate()?;
            ApiResponse::json(201, &warehouse.record_movement(&cmd)?)
        }
        Route::LowStock => ApiResponse::json(200, &warehouse.low_stock()?),
        Route::Kpi => ApiResponse::json(200, &warehouse.kpi()?),

        Route::ListSites => {
            let conn = state.pool.acquire()?;
            ApiResponse::json(200, &sites::list_sites(&conn)?)
        }
        Route::SiteNames => {
            let conn = state.pool.acquire()?;
            ApiResponse::json(200, &sites::site_names(&conn)?)
        }
        Route::CreateSite => {
            let site = req.json::<NewSite>()?.validate()?;
            let conn = state.pool.acquire()?;
            ApiResponse::json(201, &sites::create_site(&conn, &site)?)
        }

        Route::ListEmployees => {
            let conn = state.pool.acquire()?;
            ApiResponse::json(200, &employees::list_employees(&conn)?)
        }
        Route::CreateEmployee => {
            let employee = req.json::<NewEmployee>()?.validate()?;
            let conn = state.pool.acquire()?;
            ApiResponse::json(201, &employees::create_employee(&conn, &employee)?)
        }

        Route::ListHours | Route::HoursSummary => {
            let filter = HoursFilter::parse(
                req.query_param("dipendenteId"),
                req.query_param("from"),
                req.query_param("to"),
            )?;
            let conn = state.pool.acquire()?;
            let entries = hours::list_hours(&conn, &filter)?;
            if route == Route::HoursSummary {
                ApiResponse::json(200, &hours::summarize(&entries))
            } else {
                ApiResponse::json(200, &entries)
            }
        }
        Route::CreateHours => {
            let record = req.json::<NewHours>()?.validate()?;
            let conn = state.pool.acquire()?;
            let id = hours::create_hours(&conn, &record)?;
            ApiResponse::json(
                201,
                &json!({ "id": id, "ore": hours::worked_hours(record.start, record.end).to_f64() }),
            )
        }

        Route::ListSchedules => {
            let conn = state.pool.acquire()?;
            ApiResponse::json(200, &schedules::list_schedules(&conn)?)
        }
        Route::Schedule => {
            let assignment = req.json::<ScheduleRequest>()?.validate()?;
            let conn = state.pool.acquire()?;
            let report = conn.transaction(|tx| schedules::assign(tx, &assignment))?;
            ApiResponse::json(200, &report)
        }
        Route::Unassign {
            schedule_id,
            employee_id,
        } => {
            let conn = state.pool.acquire()?;
            schedules::unassign(&conn, schedule_id, employee_id)?;
            ApiResponse::message(200, "Assegnazione rimossa")
        }
        Route::AddToSchedule(id) => {
            let employees = req.json::<AddEmployeesRequest>()?.validate()?;
            let conn = state.pool.acquire()?;
            let report = conn.transaction(|tx| schedules::add_to_schedule(tx, id, &employees))?;
            ApiResponse::json(200, &report)
        }
        Route::MoveSchedule(id) => {
            let target = req.json::<MoveRequest>()?.validate()?;
            let conn = state.pool.acquire()?;
            let report = conn.transaction(|tx| schedules::move_schedule(tx, id, &target))?;
            ApiResponse::json(200, &report)
        }
        Route::Calendar => {
            let range = CalendarRange::parse(req.query_param("start"), req.query_param("end"))?;
            let conn = state.pool.acquire()?;
            ApiResponse::json(200, &schedules::calendar(&conn, &range)?)
        }

        Route::ListDeadlines => {
            let conn = state.pool.acquire()?;
            ApiResponse::json(200, &deadlines::list_deadlines(&conn)?)
        }
        Route::CreateDeadline => {
            let record = req.json::<NewDeadline>()?.validate()?;
            let conn = state.pool.acquire()?;
            ApiResponse::json(201, &deadlines::create_deadline(&conn, &record)?)
        }
        Route::MarkPaid(id) => {
            let conn = state.pool.acquire()?;
            deadlines::mark_paid(&conn, id)?;
            ApiResponse::message(200, "Scadenza aggiornata")
        }

        Route::Overview => {
            let conn = state.pool.acquire()?;
            ApiResponse::json(200, &overview::overview(&conn)?)
        }
    };
    Ok(rsp)
}

/// Liveness plus a check of one pooled connection; never fails the request
fn health(state: &AppState) -> ApiResponse {
    let database = match state.pool.acquire().and_then(|conn| conn.check_health()) {
        Ok(healthy) => healthy,
        Err(err) => {
            log::warn!("health check failed: {err}");
            false
        }
    };
    ApiResponse::json(
        200,
        &json!({ "ok": true, "database": database, "poolSize": state.pool.size() }),
    )
}

#[cfg(feature = "metrics")]
fn metrics_response() -> ApiResponse {
    match crate::metrics::render() {
        Ok(text) => ApiResponse::text(200, text),
        Err(err) => {
            log::error!("metrics rendering failed: {err}");
            ApiResponse::message(500, "Internal server error")
        }
    }
}

#[cfg(not(feature = "metrics"))]
fn metrics_response() -> ApiResponse {
    ApiResponse::not_found()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(method: &str, path: &str) -> Route {
        Route::resolve(method, path).unwrap_or_else(|e| panic!("{method} {path}: {e:?}"))
    }

    #[test]
    fn test_canonical_routes() {
        assert_eq!(resolve("GET", "/health"), Route::Health);
        assert_eq!(resolve("GET", "/magazzino/articoli"), Route::ListItems);
        assert_eq!(resolve("POST", "/magazzino/articoli"), Route::CreateItem);
        assert_eq!(resolve("PUT", "/magazzino/articoli/12"), Route::UpdateItem(12));
        assert_eq!(resolve("DELETE", "/magazzino/articoli/12/"), Route::DeleteItem(12));
        assert_eq!(resolve("POST", "/magazzino/movimenti"), Route::RecordMovement);
        assert_eq!(resolve("GET", "/magazzino/sotto-soglia"), Route::LowStock);
        assert_eq!(resolve("GET", "/ore/riepilogo"), Route::HoursSummary);
        assert_eq!(resolve("POST", "/scadenze/7/pagata"), Route::MarkPaid(7));
        assert_eq!(resolve("GET", "/overview"), Route::Overview);
        assert_eq!(resolve("PATCH", "/pianificazioni/3/assegna"), Route::AddToSchedule(3));
        assert_eq!(resolve("PATCH", "/pianificazioni/3/move"), Route::MoveSchedule(3));
        assert_eq!(resolve("GET", "/pianificazioni/calendar"), Route::Calendar);
        assert_eq!(
            resolve("DELETE", "/pianificazioni/3/dipendenti/9"),
            Route::Unassign {
                schedule_id: 3,
                employee_id: 9
            }
        );
    }

    #[test]
    fn test_legacy_paths_share_handlers() {
        assert_eq!(resolve("GET", "/cantieri/tutti"), Route::ListSites);
        assert_eq!(resolve("GET", "/api/cantieri/nomi"), Route::SiteNames);
        assert_eq!(resolve("POST", "/ore/aggiungi"), Route::CreateHours);
        assert_eq!(resolve("GET", "/ore/riepilogo-dipendenti"), Route::HoursSummary);
        assert_eq!(resolve("POST", "/scadenze/aggiorna-stato/4"), Route::MarkPaid(4));
        assert_eq!(resolve("POST", "/dashboard/api/pianifica"), Route::Schedule);
        assert_eq!(resolve("GET", "/api/magazzino/inventario"), Route::ListItems);
        assert_eq!(resolve("GET", "/api/pianificazioni/calendario"), Route::Calendar);
        assert_eq!(resolve("PATCH", "/pianificazioni/3/sposta"), Route::MoveSchedule(3));
        assert_eq!(
            resolve("DELETE", "/api/pianificazioni/3/assegna/9"),
            Route::Unassign {
                schedule_id: 3,
                employee_id: 9
            }
        );
    }

    #[test]
    fn test_unknown_routes() {
        assert_eq!(Route::resolve("GET", "/nope"), Err(RouteError::NotFound));
        assert_eq!(Route::resolve("PATCH", "/magazzino/articoli/1"), Err(RouteError::NotFound));
        assert_eq!(Route::resolve("GET", "/"), Err(RouteError::NotFound));
        assert_eq!(Route::resolve("PUT", "/pianificazioni/3/move"), Err(RouteError::NotFound));
    }

    #[test]
    fn test_bare_warehouse_post_is_an_upsert() {
        assert_eq!(resolve("POST", "/magazzino"), Route::UpsertItem);
        assert_eq!(resolve("POST", "/api/magazzino"), Route::UpsertItem);
        assert_ne!(resolve("POST", "/magazzino"), resolve("POST", "/magazzino/articoli"));
    }

    #[test]
    fn test_bad_ids() {
        assert_eq!(
            Route::resolve("PUT", "/magazzino/articoli/abc"),
            Err(RouteError::BadId("abc".into()))
        );
        assert_eq!(
            Route::resolve("POST", "/scadenze/0/pagata"),
            Err(RouteError::BadId("0".into()))
        );
        assert_eq!(
            Route::resolve("PATCH", "/pianificazioni/x/assegna"),
            Err(RouteError::BadId("x".into()))
        );
    }
}
