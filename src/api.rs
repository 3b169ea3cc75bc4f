use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use rusqlite::{Connection, params_from_iter, types::ValueRef};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::db::Db;

// Unknown query parameters deserialize to nothing and are ignored; only the
// keys named here are read.
#[derive(Deserialize)]
pub struct LimitQuery {
    limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct YearStatsQuery {
    console: Option<String>,
    genre: Option<String>,
}

type ApiError = (StatusCode, String);

fn internal(err: impl std::fmt::Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

/// Run a read query and serialize every row as a JSON object keyed by the
/// statement's column names. The table schema comes from the CSV at load
/// time, so the column set is not known here.
fn fetch_rows(conn: &Connection, sql: &str, params: &[String]) -> rusqlite::Result<Vec<Value>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let rows = stmt.query_map(params_from_iter(params), |row| {
        let mut obj = Map::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            obj.insert(name.clone(), json_value(row.get_ref(i)?));
        }
        Ok(Value::Object(obj))
    })?;
    rows.collect()
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::from(n),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// `GET /games/` — up to `limit` rows (default 100) in storage order.
pub async fn get_games(
    State(db): State<Db>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let conn = db.lock().unwrap();
    let limit = query.limit.unwrap_or(100);
    // Safe to inline: limit was parsed as an integer.
    let sql = format!("SELECT * FROM games LIMIT {limit}");
    let rows = fetch_rows(&conn, &sql, &[]).map_err(internal)?;
    Ok(Json(Value::Array(rows)))
}

/// `GET /games/stats` — dataset-wide summary. Averages and sums are over
/// non-null values only and render as null when no such values exist.
pub async fn get_game_stats(State(db): State<Db>) -> Result<Json<Value>, ApiError> {
    let conn = db.lock().unwrap();

    let total_games: i64 = conn
        .query_row("SELECT COUNT(*) FROM games", [], |row| row.get(0))
        .map_err(internal)?;
    let avg_score: Option<f64> = conn
        .query_row(
            "SELECT AVG(critic_score) FROM games WHERE critic_score IS NOT NULL",
            [],
            |row| row.get(0),
        )
        .map_err(internal)?;
    let total_sales: Option<f64> = conn
        .query_row(
            "SELECT SUM(total_sales) FROM games WHERE total_sales IS NOT NULL",
            [],
            |row| row.get(0),
        )
        .map_err(internal)?;

    let top_consoles = fetch_rows(
        &conn,
        "SELECT console, SUM(total_sales) AS sales FROM games \
         WHERE total_sales IS NOT NULL GROUP BY console \
         ORDER BY SUM(total_sales) DESC LIMIT 5",
        &[],
    )
    .map_err(internal)?;
    let top_genres = fetch_rows(
        &conn,
        "SELECT genre, SUM(total_sales) AS sales FROM games \
         WHERE total_sales IS NOT NULL GROUP BY genre \
         ORDER BY SUM(total_sales) DESC LIMIT 5",
        &[],
    )
    .map_err(internal)?;

    Ok(Json(json!({
        "total_games": total_games,
        "average_critic_score": avg_score.map(round2),
        "total_global_sales": total_sales.map(round2),
        "top_consoles": top_consoles,
        "top_genres": top_genres,
    })))
}

/// `GET /games/top-sellers` — rows with non-null sales, best-selling first.
pub async fn get_top_sellers(
    State(db): State<Db>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let conn = db.lock().unwrap();
    let limit = query.limit.unwrap_or(10);
    let sql = format!(
        "SELECT * FROM games WHERE total_sales IS NOT NULL \
         ORDER BY total_sales DESC LIMIT {limit}"
    );
    let rows = fetch_rows(&conn, &sql, &[]).map_err(internal)?;
    Ok(Json(Value::Array(rows)))
}

/// `GET /games/console/{console_name}` — exact-match rows for one console.
pub async fn get_games_by_console(
    State(db): State<Db>,
    Path(console_name): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let conn = db.lock().unwrap();
    let limit = query.limit.unwrap_or(50);
    let sql = format!("SELECT * FROM games WHERE console = ? LIMIT {limit}");
    let rows = fetch_rows(&conn, &sql, &[console_name]).map_err(internal)?;
    Ok(Json(Value::Array(rows)))
}

/// `GET /games/stats/by-year` — per-year count, average score and summed
/// sales for releases from 2000 on, with optional case-insensitive
/// console/genre filters.
pub async fn get_stats_by_year(
    State(db): State<Db>,
    Query(query): Query<YearStatsQuery>,
) -> Result<Json<Value>, ApiError> {
    let conn = db.lock().unwrap();

    let mut sql = String::from(
        "SELECT substr(release_date, 1, 4) AS year, COUNT(*) AS game_count, \
         AVG(critic_score) AS avg_score, SUM(total_sales) AS total_sales \
         FROM games WHERE release_date IS NOT NULL \
         AND substr(release_date, 1, 4) >= '2000'",
    );
    let mut params_vec: Vec<String> = vec![];

    // An empty filter value means the parameter was not given.
    if let Some(console) = query.console.filter(|c| !c.is_empty()) {
        sql.push_str(" AND lower(console) = lower(?)");
        params_vec.push(console);
    }
    if let Some(genre) = query.genre.filter(|g| !g.is_empty()) {
        sql.push_str(" AND lower(genre) = lower(?)");
        params_vec.push(genre);
    }
    sql.push_str(" GROUP BY year ORDER BY year");

    let rows = fetch_rows(&conn, &sql, &params_vec).map_err(internal)?;
    // Drop buckets where both aggregates are null.
    let rows: Vec<Value> = rows
        .into_iter()
        .filter(|row| !(row["avg_score"].is_null() && row["total_sales"].is_null()))
        .collect();
    Ok(Json(Value::Array(rows)))
}

pub async fn get_unique_consoles(State(db): State<Db>) -> Result<Json<Value>, ApiError> {
    distinct_values(&db, "console")
}

pub async fn get_unique_genres(State(db): State<Db>) -> Result<Json<Value>, ApiError> {
    distinct_values(&db, "genre")
}

fn distinct_values(db: &Db, column: &str) -> Result<Json<Value>, ApiError> {
    let conn = db.lock().unwrap();
    let sql = format!(
        "SELECT DISTINCT {column} FROM games \
         WHERE {column} IS NOT NULL AND {column} != '' ORDER BY {column}"
    );
    let mut stmt = conn.prepare(&sql).map_err(internal)?;
    let values = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(internal)?
        .collect::<rusqlite::Result<Vec<String>>>()
        .map_err(internal)?;
    Ok(Json(json!(values)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load;
    use rusqlite::Connection;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::NamedTempFile;

    const SAMPLE: &str = "\
Title,Console,Genre,Critic Score,Total Sales,Release Date
Gran Turismo,PS1,Racing,9.5,10.95,1997-12-23
Halo 3,X360,Shooter,9.4,12.13,2007-09-25
Wii Sports,Wii,Sports,7.7,82.9,2006-11-19
Minecraft,PC,Sandbox,,33.15,2011-11-18
Obscure Game,PS2,Puzzle,,,2003-04-01
";

    const HEADER_ONLY: &str = "Title,Console,Genre,Critic Score,Total Sales,Release Date\n";

    fn seed(csv: &str) -> Db {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(csv.as_bytes()).unwrap();
        file.flush().unwrap();
        let mut conn = Connection::open_in_memory().unwrap();
        load::load_csv(&mut conn, file.path()).unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn as_array(json: Json<Value>) -> Vec<Value> {
        json.0.as_array().unwrap().clone()
    }

    fn limit(n: Option<i64>) -> Query<LimitQuery> {
        Query(LimitQuery { limit: n })
    }

    #[tokio::test]
    async fn list_games_applies_limit() {
        let db = seed(SAMPLE);
        let res = get_games(State(db), limit(Some(2))).await.unwrap();
        assert_eq!(as_array(res).len(), 2);
    }

    #[tokio::test]
    async fn list_games_returns_row_objects() {
        let db = seed(SAMPLE);
        let res = get_games(State(db), limit(None)).await.unwrap();
        let rows = as_array(res);
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0]["title"], "Gran Turismo");
        assert_eq!(rows[0]["critic_score"], json!(9.5));
        assert!(rows[3]["critic_score"].is_null());
    }

    #[tokio::test]
    async fn stats_on_empty_table() {
        let db = seed(HEADER_ONLY);
        let res = get_game_stats(State(db)).await.unwrap().0;
        assert_eq!(res["total_games"], 0);
        assert!(res["average_critic_score"].is_null());
        assert!(res["total_global_sales"].is_null());
        assert_eq!(res["top_consoles"], json!([]));
        assert_eq!(res["top_genres"], json!([]));
    }

    #[tokio::test]
    async fn stats_rounds_summary_to_two_decimals() {
        let db = seed(SAMPLE);
        let res = get_game_stats(State(db)).await.unwrap().0;
        assert_eq!(res["total_games"], 5);
        // (9.5 + 9.4 + 7.7) / 3 = 8.866... -> 8.87
        assert_eq!(res["average_critic_score"], json!(8.87));
        assert_eq!(res["total_global_sales"], json!(139.13));
        let consoles = res["top_consoles"].as_array().unwrap();
        assert_eq!(consoles[0]["console"], "Wii");
        assert_eq!(consoles[0]["sales"], json!(82.9));
    }

    #[tokio::test]
    async fn top_sellers_sorted_descending() {
        let db = seed(SAMPLE);
        let res = get_top_sellers(State(db), limit(Some(3))).await.unwrap();
        let rows = as_array(res);
        assert_eq!(rows.len(), 3);
        let sales: Vec<f64> = rows
            .iter()
            .map(|row| row["total_sales"].as_f64().unwrap())
            .collect();
        assert!(sales.windows(2).all(|pair| pair[0] >= pair[1]));
        assert_eq!(rows[0]["title"], "Wii Sports");
    }

    #[tokio::test]
    async fn top_sellers_excludes_null_sales() {
        let db = seed(SAMPLE);
        let res = get_top_sellers(State(db), limit(None)).await.unwrap();
        // Obscure Game has no sales figure
        assert_eq!(as_array(res).len(), 4);
    }

    #[tokio::test]
    async fn filter_by_console_is_exact_match() {
        let db = seed(SAMPLE);
        let res = get_games_by_console(State(db), Path("PS1".to_string()), limit(None))
            .await
            .unwrap();
        let rows = as_array(res);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], "Gran Turismo");
    }

    #[tokio::test]
    async fn unknown_console_returns_empty_list() {
        let db = seed(SAMPLE);
        let res = get_games_by_console(State(db), Path("Dreamcast".to_string()), limit(None))
            .await
            .unwrap();
        assert!(as_array(res).is_empty());
    }

    #[tokio::test]
    async fn year_stats_excludes_old_and_all_null_buckets() {
        let db = seed(SAMPLE);
        let res = get_stats_by_year(
            State(db),
            Query(YearStatsQuery {
                console: None,
                genre: None,
            }),
        )
        .await
        .unwrap();
        let rows = as_array(res);
        // 1997 is before 2000; the 2003 bucket has neither a score nor sales
        let years: Vec<&str> = rows
            .iter()
            .map(|row| row["year"].as_str().unwrap())
            .collect();
        assert_eq!(years, ["2006", "2007", "2011"]);
        assert_eq!(rows[0]["game_count"], 1);
        assert_eq!(rows[0]["avg_score"], json!(7.7));
    }

    #[tokio::test]
    async fn year_stats_console_filter_is_case_insensitive() {
        let db = seed(SAMPLE);
        let res = get_stats_by_year(
            State(db),
            Query(YearStatsQuery {
                console: Some("wii".to_string()),
                genre: None,
            }),
        )
        .await
        .unwrap();
        let rows = as_array(res);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["year"], "2006");
    }

    #[tokio::test]
    async fn distinct_consoles_sorted_without_blanks() {
        let db = seed("Title,Console\nA,Wii\nB,\nC,PS1\nD,Wii\n");
        let res = get_unique_consoles(State(db)).await.unwrap();
        assert_eq!(res.0, json!(["PS1", "Wii"]));
    }

    #[tokio::test]
    async fn distinct_genres_sorted() {
        let db = seed(SAMPLE);
        let res = get_unique_genres(State(db)).await.unwrap();
        assert_eq!(
            res.0,
            json!(["Puzzle", "Racing", "Sandbox", "Shooter", "Sports"])
        );
    }
}
