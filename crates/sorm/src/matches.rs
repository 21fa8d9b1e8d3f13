//! Streaming reads.

use crate::bind::{BindScope, bind_all};
use crate::mapping::map_row;
use crate::orm::Orm;
use sorm_core::{Connection, Entity, Result, Statement};
use sorm_query::CompiledStatement;
use sorm_session::{EntityRef, Session};
use std::sync::{Arc, RwLock};

/// A single-pass, forward-only producer of entities for a key sequence.
///
/// Each key is served from the identity cache when possible, else read with
/// the prepared read statement, cached and yielded. Keys with no row are
/// skipped. The read statement stays prepared until [`Matches::close`] is
/// called or the producer is dropped; scanning again needs a fresh producer.
///
/// Storage errors are yielded in-band; the producer stops after the first
/// one.
pub struct Matches<'a, E: Entity, C: Connection + 'a> {
    orm: &'a Orm<E>,
    session: &'a Session<C>,
    statement: &'a CompiledStatement,
    prepared: Option<C::Statement<'a>>,
    keys: std::vec::IntoIter<E::Key>,
    failed: bool,
}

impl<'a, E: Entity, C: Connection + 'a> Matches<'a, E, C> {
    pub(crate) fn new(
        orm: &'a Orm<E>,
        session: &'a Session<C>,
        statement: &'a CompiledStatement,
        keys: Vec<E::Key>,
    ) -> Result<Self> {
        let prepared = session.prepare(&statement.sql)?;
        Ok(Self {
            orm,
            session,
            statement,
            prepared: Some(prepared),
            keys: keys.into_iter(),
            failed: false,
        })
    }

    /// Keys not yet consumed.
    pub fn remaining(&self) -> usize {
        self.keys.len()
    }

    /// Release the prepared statement. Later calls to `next` yield nothing.
    pub fn close(mut self) -> Result<()> {
        self.keys = Vec::new().into_iter();
        match self.prepared.take() {
            Some(prepared) => prepared.close(),
            None => Ok(()),
        }
    }

    fn fetch(&mut self, key: E::Key) -> Result<Option<EntityRef<E>>> {
        if let Some(cached) = self.session.cache_get::<E>(&key)? {
            return Ok(Some(cached));
        }
        let Some(prepared) = self.prepared.as_mut() else {
            return Ok(None);
        };
        let key_value = key.clone().into();
        bind_all(
            prepared,
            self.statement,
            self.orm.codecs(),
            &BindScope::key(&key_value),
        )?;
        let Some(row) = prepared.query_one()? else {
            return Ok(None);
        };
        let entity: E = map_row(self.orm.plan(), self.orm.codecs(), &row, &key)?;
        let handle = Arc::new(RwLock::new(entity));
        self.session.cache_add(key, &handle)?;
        Ok(Some(handle))
    }
}

impl<E: Entity, C: Connection> Iterator for Matches<'_, E, C> {
    type Item = Result<EntityRef<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.prepared.is_none() {
            return None;
        }
        loop {
            let key = self.keys.next()?;
            match self.fetch(key) {
                Ok(Some(handle)) => return Some(Ok(handle)),
                Ok(None) => {}
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
