//! Application-defined SQL functions.
//!
//! # Invariants
//! - `casefold(text)` lowercases with Unicode rules and maps `NULL` to `NULL`.
//! - Connections returned by `open_db` / `open_db_in_memory` have every
//!   function here registered; raw connections must call
//!   `register_functions` before repository searches.

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

/// Registers the core's scalar functions on `conn`.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "casefold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|text| text.to_lowercase()))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::register_functions;
    use rusqlite::Connection;

    fn casefold(conn: &Connection, input: Option<&str>) -> Option<String> {
        conn.query_row("SELECT casefold(?1);", [input], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn casefold_lowercases_beyond_ascii() {
        let conn = Connection::open_in_memory().unwrap();
        register_functions(&conn).unwrap();

        assert_eq!(casefold(&conn, Some("ÜBER Gnade")).as_deref(), Some("über gnade"));
        assert_eq!(casefold(&conn, Some("ΧΆΡΙΣ")).as_deref(), Some("χάρις"));
        assert_eq!(casefold(&conn, None), None);
    }

    #[test]
    fn casefold_is_usable_for_substring_search() {
        let conn = Connection::open_in_memory().unwrap();
        register_functions(&conn).unwrap();

        let hit: bool = conn
            .query_row(
                "SELECT instr(casefold(?1), casefold(?2)) > 0;",
                ["Die ÜBERGROSSE Gnade", "übergrosse"],
                |row| row.get(0),
            )
            .unwrap();
        assert!(hit);
    }
}
