//! Lua scripts for atomic Redis operations
//!
//! - `release_claim`: delete a fingerprint claim only if the caller holds it
//! - `put_result`: store a result and index it under its project
//! - `invalidate_project`: delete every result indexed under a project
//! - `put_job`: write a job status and its expiry score
//! - `list_jobs`: prune expired jobs and return the rest

use parking_lot::RwLock;
use redis::Script;
use std::collections::HashMap;
use std::sync::Arc;

/// Compiled scripts, cached by name
pub struct LuaScripts {
    cache: RwLock<HashMap<&'static str, Arc<Script>>>,
}

impl LuaScripts {
    /// Empty script cache
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_create(&self, name: &'static str, lua: &str) -> Arc<Script> {
        if let Some(script) = self.cache.read().get(name) {
            return Arc::clone(script);
        }

        let script = Arc::new(Script::new(lua));
        self.cache.write().insert(name, Arc::clone(&script));
        script
    }

    /// Release a claim held by a given job
    ///
    /// # Keys
    /// - KEYS[1]: claim key
    ///
    /// # Arguments
    /// - ARGV[1]: job id of the releasing job
    ///
    /// # Returns
    /// - 1 if the claim was deleted
    /// - 0 if it was absent or held by another job
    pub fn release_claim(&self) -> Arc<Script> {
        self.get_or_create(
            "release_claim",
            r#"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            end
            return 0
            "#,
        )
    }

    /// Store a result and add its key to the project index
    ///
    /// # Keys
    /// - KEYS[1]: result key
    /// - KEYS[2]: project index (set of result keys)
    ///
    /// # Arguments
    /// - ARGV[1]: result JSON
    /// - ARGV[2]: ttl in milliseconds
    pub fn put_result(&self) -> Arc<Script> {
        self.get_or_create(
            "put_result",
            r#"
            redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
            redis.call('SADD', KEYS[2], KEYS[1])
            if redis.call('PTTL', KEYS[2]) < tonumber(ARGV[2]) then
                redis.call('PEXPIRE', KEYS[2], ARGV[2])
            end
            return 1
            "#,
        )
    }

    /// Delete the results of a project
    ///
    /// # Keys
    /// - KEYS[1]: project index
    ///
    /// # Returns
    /// Number of result keys that still existed
    pub fn invalidate_project(&self) -> Arc<Script> {
        self.get_or_create(
            "invalidate_project",
            r#"
            local removed = 0
            for _, key in ipairs(redis.call('SMEMBERS', KEYS[1])) do
                removed = removed + redis.call('DEL', key)
            end
            redis.call('DEL', KEYS[1])
            return removed
            "#,
        )
    }

    /// Store a job status in the customer registry
    ///
    /// # Keys
    /// - KEYS[1]: customer job registry (hash job_id -> status JSON)
    /// - KEYS[2]: job expiry index (sorted set job_id -> expiry ms)
    ///
    /// # Arguments
    /// - ARGV[1]: job id
    /// - ARGV[2]: status JSON
    /// - ARGV[3]: expiry score, `+inf` while the job is ongoing
    /// - ARGV[4]: registry ttl in milliseconds
    pub fn put_job(&self) -> Arc<Script> {
        self.get_or_create(
            "put_job",
            r#"
            redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
            redis.call('ZADD', KEYS[2], ARGV[3], ARGV[1])
            if redis.call('PTTL', KEYS[1]) < tonumber(ARGV[4]) then
                redis.call('PEXPIRE', KEYS[1], ARGV[4])
                redis.call('PEXPIRE', KEYS[2], ARGV[4])
            end
            return 1
            "#,
        )
    }

    /// Drop expired jobs, then return every remaining status
    ///
    /// # Keys
    /// - KEYS[1]: customer job registry
    /// - KEYS[2]: job expiry index
    ///
    /// # Arguments
    /// - ARGV[1]: current time in milliseconds
    pub fn list_jobs(&self) -> Arc<Script> {
        self.get_or_create(
            "list_jobs",
            r#"
            local expired = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
            for _, id in ipairs(expired) do
                redis.call('HDEL', KEYS[1], id)
            end
            if #expired > 0 then
                redis.call('ZREMRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
            end
            return redis.call('HVALS', KEYS[1])
            "#,
        )
    }

    /// Number of compiled scripts
    pub fn cached_count(&self) -> usize {
        self.cache.read().len()
    }
}

impl Default for LuaScripts {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_are_cached() {
        let scripts = LuaScripts::new();
        let first = scripts.release_claim();
        let second = scripts.release_claim();
        assert!(Arc::ptr_eq(&first, &second));

        scripts.put_job();
        scripts.list_jobs();
        assert_eq!(scripts.cached_count(), 3);
    }
}
