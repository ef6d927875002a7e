use std::{any::Any, cell::OnceCell, fmt, rc::Rc};

use crate::error::{Error, Result};

/// Database providers known by invariant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Odbc,
    OleDb,
    SqlClient,
    SqlServerCe,
    EntityClient,
    OracleClient,
    Sqlite,
    MicrosoftSqlClient,
    MicrosoftSqlServerCe,
    MicrosoftSqlite,
    OracleDataAccess,
    MySqlData,
    MySqlConnector,
    Npgsql,
}

/// `(kind, invariant name, connection type)`, in variant order.
const PROVIDERS: &[(ProviderKind, &str, &str)] = &[
    (ProviderKind::Odbc, "System.Data.Odbc", "System.Data.Odbc.OdbcConnection"),
    (ProviderKind::OleDb, "System.Data.OleDb", "System.Data.OleDb.OleDbConnection"),
    (ProviderKind::SqlClient, "System.Data.SqlClient", "System.Data.SqlClient.SqlConnection"),
    (
        ProviderKind::SqlServerCe,
        "System.Data.SqlServerCe",
        "System.Data.SqlServerCe.SqlCeConnection",
    ),
    (
        ProviderKind::EntityClient,
        "System.Data.EntityClient",
        "System.Data.EntityClient.EntityConnection",
    ),
    (
        ProviderKind::OracleClient,
        "System.Data.OracleClient",
        "System.Data.OracleClient.OracleConnection",
    ),
    (ProviderKind::Sqlite, "System.Data.SQLite", "System.Data.SQLite.SQLiteConnection"),
    (
        ProviderKind::MicrosoftSqlClient,
        "Microsoft.Data.SqlClient",
        "Microsoft.Data.SqlClient.SqlConnection",
    ),
    (
        ProviderKind::MicrosoftSqlServerCe,
        "Microsoft.SqlServerCe.Client",
        "Microsoft.SqlServerCe.Client.SqlCeConnection",
    ),
    (
        ProviderKind::MicrosoftSqlite,
        "Microsoft.Data.Sqlite",
        "Microsoft.Data.Sqlite.SqliteConnection",
    ),
    (
        ProviderKind::OracleDataAccess,
        "Oracle.DataAccess.Client",
        "Oracle.DataAccess.Client.OracleConnection",
    ),
    (
        ProviderKind::MySqlData,
        "MySql.Data.MySqlClient",
        "MySql.Data.MySqlClient.MySqlConnection",
    ),
    (ProviderKind::MySqlConnector, "MySqlConnector", "MySqlConnector.MySqlConnection"),
    (ProviderKind::Npgsql, "Npgsql", "Npgsql.NpgsqlConnection"),
];

impl ProviderKind {
    /// Looks a provider up by invariant name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        PROVIDERS
            .iter()
            .find(|(_, invariant, _)| invariant.eq_ignore_ascii_case(name.trim()))
            .map(|(kind, _, _)| *kind)
    }

    pub fn invariant_name(self) -> &'static str {
        self.entry().1
    }

    /// Type name of the connection implementation for this provider.
    pub fn connection_type(self) -> &'static str {
        self.entry().2
    }

    pub fn all() -> impl Iterator<Item = ProviderKind> {
        PROVIDERS.iter().map(|(kind, _, _)| *kind)
    }

    fn entry(self) -> &'static (ProviderKind, &'static str, &'static str) {
        &PROVIDERS[self as usize]
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.invariant_name())
    }
}

/// Builds a connection object for a resolved provider.
///
/// Closures `Fn(ProviderKind, &str) -> Result<C>` implement this trait.
pub trait ProviderResolver {
    type Connection;

    fn connect(&self, provider: ProviderKind, connection_string: &str)
    -> Result<Self::Connection>;
}

impl<F, C> ProviderResolver for F
where
    F: Fn(ProviderKind, &str) -> Result<C>,
{
    type Connection = C;

    fn connect(&self, provider: ProviderKind, connection_string: &str) -> Result<C> {
        self(provider, connection_string)
    }
}

/// One `connectionStrings` entry.
#[derive(Debug, Clone)]
pub struct ConnectionValue {
    connection_string: String,
    provider_name: Option<String>,
    provider: OnceCell<Option<ProviderKind>>,
    connection: OnceCell<Rc<dyn Any>>,
}

impl ConnectionValue {
    /// An empty provider name counts as absent.
    pub fn new(connection_string: &str, provider_name: Option<&str>) -> Self {
        Self {
            connection_string: connection_string.to_string(),
            provider_name: provider_name
                .filter(|p| !p.trim().is_empty())
                .map(str::to_string),
            provider: OnceCell::new(),
            connection: OnceCell::new(),
        }
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider_name.as_deref()
    }

    /// Resolves the provider name against the known providers.
    ///
    /// The lookup runs at most once per entry.
    pub fn provider(&self) -> Result<ProviderKind> {
        let resolved = self.provider.get_or_init(|| {
            let kind = self.provider_name.as_deref().and_then(ProviderKind::from_name);
            trace!("provider {:?} resolved to {kind:?}", self.provider_name);
            kind
        });
        (*resolved).ok_or_else(|| Error::ProviderNotFound(self.provider_name.clone()))
    }

    /// Builds the connection of this entry through `resolver`.
    ///
    /// The connection is built on the first call only; later calls return
    /// the same instance. Asking for a connection type other than the one
    /// already built fails with [`Error::UnsupportedType`].
    pub fn connect<R>(&self, resolver: &R) -> Result<Rc<R::Connection>>
    where
        R: ProviderResolver,
        R::Connection: 'static,
    {
        if let Some(built) = self.connection.get() {
            return Rc::clone(built)
                .downcast::<R::Connection>()
                .map_err(|_| Error::UnsupportedType(std::any::type_name::<R::Connection>().into()));
        }
        let provider = self.provider()?;
        let connection = Rc::new(resolver.connect(provider, &self.connection_string)?);
        let erased: Rc<dyn Any> = connection.clone();
        let _ = self.connection.set(erased);
        debug!("built {provider} connection");
        Ok(connection)
    }
}

impl PartialEq for ConnectionValue {
    fn eq(&self, other: &Self) -> bool {
        self.connection_string == other.connection_string
            && self.provider_name == other.provider_name
    }
}

impl Eq for ConnectionValue {}

impl From<&str> for ConnectionValue {
    fn from(connection_string: &str) -> Self {
        Self::new(connection_string, None)
    }
}

impl From<(&str, &str)> for ConnectionValue {
    fn from((connection_string, provider_name): (&str, &str)) -> Self {
        Self::new(connection_string, Some(provider_name))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn test_provider_table() {
        assert_eq!(ProviderKind::all().count(), PROVIDERS.len());
        for (i, kind) in ProviderKind::all().enumerate() {
            assert_eq!(kind as usize, i);
            assert_eq!(ProviderKind::from_name(kind.invariant_name()), Some(kind));
        }
        assert_eq!(
            ProviderKind::from_name("system.data.sqlite"),
            Some(ProviderKind::Sqlite)
        );
        assert_eq!(
            ProviderKind::Npgsql.connection_type(),
            "Npgsql.NpgsqlConnection"
        );
        assert_eq!(ProviderKind::from_name("Nope"), None);
    }

    #[test]
    fn test_provider_not_found() {
        let value = ConnectionValue::new("Server=.", None);
        assert!(matches!(value.provider(), Err(Error::ProviderNotFound(None))));

        let value = ConnectionValue::new("Server=.", Some("Acme.Db"));
        assert!(matches!(
            value.provider(),
            Err(Error::ProviderNotFound(Some(name))) if name == "Acme.Db"
        ));

        let value = ConnectionValue::new("Server=.", Some("  "));
        assert_eq!(value.provider_name(), None);
    }

    #[test]
    fn test_connect_builds_once() {
        let calls = Cell::new(0);
        let resolver = |kind: ProviderKind, cs: &str| -> Result<String> {
            calls.set(calls.get() + 1);
            Ok(format!("{}({cs})", kind.connection_type()))
        };
        let value = ConnectionValue::from(("Data Source=app.db", "System.Data.SQLite"));
        let first = value.connect(&resolver).unwrap();
        assert_eq!(
            first.as_str(),
            "System.Data.SQLite.SQLiteConnection(Data Source=app.db)"
        );
        let second = value.connect(&resolver).unwrap();
        assert_eq!(calls.get(), 1);
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(value.provider().unwrap(), ProviderKind::Sqlite);

        let other = |_: ProviderKind, _: &str| -> Result<u32> { Ok(7) };
        assert!(matches!(
            value.connect(&other),
            Err(Error::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_failed_connect_is_retried() {
        let calls = Cell::new(0);
        let resolver = |_: ProviderKind, _: &str| -> Result<u8> {
            calls.set(calls.get() + 1);
            Err(Error::malformed("unreachable host"))
        };
        let value = ConnectionValue::new("Host=db", Some("Npgsql"));
        assert!(value.connect(&resolver).is_err());
        assert!(value.connect(&resolver).is_err());
        assert_eq!(calls.get(), 2);

        let missing = ConnectionValue::new("Host=db", None);
        assert!(matches!(
            missing.connect(&resolver),
            Err(Error::ProviderNotFound(None))
        ));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_equality_ignores_memo() {
        let a = ConnectionValue::new("x", Some("Npgsql"));
        let b = a.clone();
        a.provider().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, ConnectionValue::from("x"));
    }
}
