use std::collections::HashMap;

/// Every backend command the fan-out client exposes by default.
pub const COMMANDS: &[&str] = &[
    "append", "asking", "auth", "bgrewriteaof", "bgsave", "bitcount", "bitfield", "bitop",
    "bitpos", "blpop", "brpop", "brpoplpush", "bzpopmax", "bzpopmin", "client", "cluster",
    "command", "config", "dbsize", "debug", "decr", "decrby", "del", "discard", "dump", "echo",
    "eval", "evalsha", "exec", "exists", "expire", "expireat", "flushall", "flushdb", "geoadd",
    "geodist", "geohash", "geopos", "georadius", "georadius_ro", "georadiusbymember",
    "georadiusbymember_ro", "get", "getbit", "getdel", "getex", "getrange", "getset", "hdel",
    "hexists", "hget", "hgetall", "hincrby", "hincrbyfloat", "hkeys", "hlen", "hmget", "hmset",
    "hscan", "hset", "hsetnx", "hstrlen", "hvals", "incr", "incrby", "incrbyfloat", "info",
    "keys", "lastsave", "latency", "lindex", "linsert", "llen", "lpop", "lpush", "lpushx",
    "lrange", "lrem", "lset", "ltrim", "memory", "mget", "migrate", "module", "monitor", "move",
    "mset", "msetnx", "multi", "object", "persist", "pexpire", "pexpireat", "pfadd", "pfcount",
    "pfdebug", "pfmerge", "pfselftest", "ping", "post", "psetex", "psubscribe", "psync", "pttl",
    "publish", "pubsub", "punsubscribe", "quit", "randomkey", "readonly", "readwrite", "rename",
    "renamenx", "replconf", "restore", "restore-asking", "role", "rpop", "rpoplpush", "rpush",
    "rpushx", "sadd", "save", "scan", "scard", "script", "sdiff", "sdiffstore", "select", "set",
    "setbit", "setex", "setnx", "setrange", "shutdown", "sinter", "sinterstore", "sismember",
    "slaveof", "slowlog", "smembers", "smove", "sort", "spop", "srandmember", "srem", "sscan",
    "strlen", "subscribe", "substr", "sunion", "sunionstore", "swapdb", "sync", "time", "touch",
    "ttl", "type", "unlink", "unsubscribe", "unwatch", "wait", "watch", "xack", "xadd", "xclaim",
    "xdel", "xgroup", "xinfo", "xlen", "xpending", "xrange", "xread", "xreadgroup", "xrevrange",
    "xtrim", "zadd", "zcard", "zcount", "zincrby", "zinterstore", "zlexcount", "zpopmax",
    "zpopmin", "zrange", "zrangebylex", "zrangebyscore", "zrank", "zrem", "zremrangebylex",
    "zremrangebyrank", "zremrangebyscore", "zrevrange", "zrevrangebylex", "zrevrangebyscore",
    "zrevrank", "zscan", "zscore", "zunionstore",
];

/// Commands whose name looks like a read but which modify the key.
///
/// They must reach every backend, so they are dispatched like writes.
pub const READ_MODIFY_COMMANDS: &[&str] = &["getset", "getdel", "getex"];

/// Scheduling class of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Retrieval command: any backend holding the value may answer
    Read,
    /// Mutating or control command: every backend receives it
    Write,
}

impl CommandKind {
    /// Classifies a command name.
    ///
    /// "get-like" names (containing `get`) are reads, except the
    /// read-modify commands in [`READ_MODIFY_COMMANDS`].
    pub fn classify(command: &str) -> Self {
        let command = command.to_ascii_lowercase();
        if command.contains("get") && !READ_MODIFY_COMMANDS.contains(&command.as_str()) {
            CommandKind::Read
        } else {
            CommandKind::Write
        }
    }
}

/// Lookup table from command name to its scheduling class.
///
/// Built once when a client is created. Lookups are case-insensitive, so
/// `get` and `GET` resolve to the same entry.
///
/// # Example
///
/// ```
/// use multiredis_common::{CommandKind, CommandTable};
///
/// let table = CommandTable::builtin();
/// assert_eq!(table.kind("GET"), Some(CommandKind::Read));
/// assert_eq!(table.kind("getset"), Some(CommandKind::Write));
/// assert_eq!(table.kind("nosuchcommand"), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    kinds: HashMap<String, CommandKind>,
}

impl CommandTable {
    /// Table of every command in [`COMMANDS`], classified by [`CommandKind::classify`].
    pub fn builtin() -> Self {
        Self::from_names(COMMANDS.iter().copied())
    }

    /// Builds a table from command names, classifying each one.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let kinds = names
            .into_iter()
            .map(|name| {
                let name = name.as_ref().to_ascii_lowercase();
                let kind = CommandKind::classify(&name);
                (name, kind)
            })
            .collect();
        Self { kinds }
    }

    /// Adds or reclassifies a single command.
    pub fn insert(&mut self, command: &str, kind: CommandKind) {
        self.kinds.insert(command.to_ascii_lowercase(), kind);
    }

    pub fn kind(&self, command: &str) -> Option<CommandKind> {
        self.kinds.get(&command.to_ascii_lowercase()).copied()
    }

    pub fn contains(&self, command: &str) -> bool {
        self.kind(command).is_some()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Supported command names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.kinds.keys().cloned().collect();
        names.sort();
        names
    }
}
