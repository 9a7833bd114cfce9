// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use memlock::locking::{CasLock, LockOptions};
use memlock::store::InMemoryStore;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const KEY: &str = "job:42";
const COUNTER: &str = "job:42:counter";

fn read_counter(store: &InMemoryStore) -> u64 {
    store
        .get(COUNTER)
        .unwrap()
        .map(|raw| String::from_utf8(raw).unwrap().parse().unwrap())
        .unwrap_or(0)
}

fn race(options: LockOptions, iterations: usize) -> (u64, usize) {
    let store = Arc::new(InMemoryStore::new());

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                let mut lock = CasLock::new(store.clone(), KEY, options).unwrap();
                let mut successes = 0;
                for _ in 0..iterations {
                    if !lock
                        .acquire(Duration::from_secs(1), Duration::from_secs(5))
                        .unwrap()
                    {
                        continue;
                    }
                    let current = read_counter(&store);
                    thread::yield_now();
                    store
                        .set(COUNTER, (current + 1).to_string().as_bytes(), 0)
                        .unwrap();
                    assert!(lock.release().unwrap());
                    successes += 1;
                }
                successes
            })
        })
        .collect();

    let successes = handles.into_iter().map(|h| h.join().unwrap()).sum();
    (read_counter(&store), successes)
}

#[test]
fn two_racers_never_lose_updates() {
    let (counter, successes) = race(LockOptions::new(), 1_000);
    assert!(successes > 0);
    assert_eq!(counter, successes as u64);
}

#[test]
fn two_racers_never_lose_updates_with_self_sync() {
    let (counter, successes) = race(LockOptions::new().with_self_expire_sync(true), 1_000);
    assert!(successes > 0);
    assert_eq!(counter, successes as u64);
}

#[test]
fn many_racers_with_short_holds() {
    let store = Arc::new(InMemoryStore::new());
    let options = LockOptions::new().with_self_expire_sync(true);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                let mut lock = CasLock::new(store.clone(), KEY, options).unwrap();
                let mut successes = 0u64;
                for _ in 0..50 {
                    let acquired = lock
                        .with_lock(Duration::from_millis(500), Duration::from_secs(10), |_| {
                            let current = read_counter(&store);
                            thread::sleep(Duration::from_micros(200));
                            store
                                .set(COUNTER, (current + 1).to_string().as_bytes(), 0)
                                .unwrap();
                        })
                        .unwrap();
                    if acquired.is_some() {
                        successes += 1;
                    }
                }
                successes
            })
        })
        .collect();

    let successes: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(read_counter(&store), successes);
}
