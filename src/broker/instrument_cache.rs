use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
struct Entry {
    ticker: String,
    instrument_id: String,
    inserted_at: Instant,
}

#[derive(Debug, Default)]
struct Maps {
    by_ticker: HashMap<String, Entry>,
    by_instrument: HashMap<String, Entry>,
}

/// Bidirectional ticker <-> instrument id cache
///
/// Owned by the broker client. Entries expire after `ttl`; when `capacity`
/// is reached the oldest entry is evicted first.
#[derive(Debug)]
pub struct InstrumentCache {
    maps: Mutex<Maps>,
    ttl: Duration,
    capacity: usize,
}

impl Default for InstrumentCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}

impl InstrumentCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            maps: Mutex::new(Maps::default()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn instrument_id(&self, ticker: &str) -> Option<String> {
        let mut maps = self.lock();
        let entry = maps.by_ticker.get(ticker)?.clone();
        if entry.inserted_at.elapsed() > self.ttl {
            Self::remove(&mut maps, &entry);
            return None;
        }
        Some(entry.instrument_id)
    }

    pub fn ticker(&self, instrument_id: &str) -> Option<String> {
        let mut maps = self.lock();
        let entry = maps.by_instrument.get(instrument_id)?.clone();
        if entry.inserted_at.elapsed() > self.ttl {
            Self::remove(&mut maps, &entry);
            return None;
        }
        Some(entry.ticker)
    }

    pub fn insert(&self, ticker: &str, instrument_id: &str) {
        let mut maps = self.lock();

        if let Some(previous) = maps.by_ticker.get(ticker).cloned() {
            Self::remove(&mut maps, &previous);
        }
        if let Some(previous) = maps.by_instrument.get(instrument_id).cloned() {
            Self::remove(&mut maps, &previous);
        }

        self.make_room(&mut maps);

        let entry = Entry {
            ticker: ticker.to_string(),
            instrument_id: instrument_id.to_string(),
            inserted_at: Instant::now(),
        };
        maps.by_instrument
            .insert(instrument_id.to_string(), entry.clone());
        maps.by_ticker.insert(ticker.to_string(), entry);
    }

    /// Map a search query to an instrument without touching the reverse lookup
    pub fn insert_alias(&self, alias: &str, instrument_id: &str) {
        let mut maps = self.lock();

        if let Some(previous) = maps.by_ticker.get(alias).cloned() {
            Self::remove(&mut maps, &previous);
        }
        self.make_room(&mut maps);

        maps.by_ticker.insert(
            alias.to_string(),
            Entry {
                ticker: alias.to_string(),
                instrument_id: instrument_id.to_string(),
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.lock().by_ticker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut maps = self.lock();
        maps.by_ticker.clear();
        maps.by_instrument.clear();
    }

    fn make_room(&self, maps: &mut Maps) {
        while maps.by_ticker.len() >= self.capacity {
            let oldest = maps
                .by_ticker
                .values()
                .min_by_key(|e| e.inserted_at)
                .cloned();
            match oldest {
                Some(entry) => Self::remove(maps, &entry),
                None => break,
            }
        }
    }

    // Aliases share an instrument id with the canonical entry; only drop exact pairs
    fn remove(maps: &mut Maps, entry: &Entry) {
        if maps
            .by_ticker
            .get(&entry.ticker)
            .is_some_and(|e| e.instrument_id == entry.instrument_id)
        {
            maps.by_ticker.remove(&entry.ticker);
        }
        if maps
            .by_instrument
            .get(&entry.instrument_id)
            .is_some_and(|e| e.ticker == entry.ticker)
        {
            maps.by_instrument.remove(&entry.instrument_id);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Maps> {
        // A poisoned cache only ever holds plain strings, so keep using it
        self.maps.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
