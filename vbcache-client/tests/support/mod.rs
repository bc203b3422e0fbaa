// SPDX-License-Identifier: MIT
// Copyright (c) 2026 vbcache contributors – https://github.com/vbcache/vbcache

//! A scripted single-connection memcached node for integration tests: enough
//! of the binary protocol to honor quiet-get silence, SASL PLAIN, storage,
//! arithmetic and TAP streaming.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::thread;

use vbcache_client::codec::{self, Extras, Opcode};
use vbcache_client::{Callbacks, GrowBuf, Status, StorageOp};

#[derive(Debug, Clone)]
pub struct Item {
    pub value: Vec<u8>,
    pub flags: u32,
    pub cas: u64,
}

pub struct NodeConfig {
    pub items: Vec<(Vec<u8>, Item)>,
    pub auth: Option<(String, String)>,
    pub mechs: String,
    /// Reads and records requests but never answers.
    pub mute: bool,
}

impl Default for NodeConfig {
    fn default() -> NodeConfig {
        NodeConfig {
            items: Vec::new(),
            auth: None,
            mechs: "PLAIN".to_string(),
            mute: false,
        }
    }
}

impl NodeConfig {
    pub fn with_item(mut self, key: &[u8], value: &[u8], flags: u32, cas: u64) -> NodeConfig {
        self.items.push((
            key.to_vec(),
            Item {
                value: value.to_vec(),
                flags,
                cas,
            },
        ));
        self
    }

    pub fn with_auth(mut self, user: &str, password: &str) -> NodeConfig {
        self.auth = Some((user.to_string(), password.to_string()));
        self
    }

    pub fn with_mechs(mut self, mechs: &str) -> NodeConfig {
        self.mechs = mechs.to_string();
        self
    }

    pub fn muted(mut self) -> NodeConfig {
        self.mute = true;
        self
    }
}

pub struct Node {
    addr: SocketAddr,
    ops: Arc<Mutex<Vec<u8>>>,
    auth_values: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Node {
    pub fn spawn(config: NodeConfig) -> Node {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind scripted node");
        let addr = listener.local_addr().expect("node address");
        let ops = Arc::new(Mutex::new(Vec::new()));
        let auth_values = Arc::new(Mutex::new(Vec::new()));
        let thread_ops = ops.clone();
        let thread_auth = auth_values.clone();
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                serve(stream, config, thread_ops, thread_auth);
            }
        });
        Node {
            addr,
            ops,
            auth_values,
        }
    }

    pub fn addr_string(&self) -> String {
        self.addr.to_string()
    }

    /// Opcode order as seen on the wire.
    pub fn opcodes(&self) -> Vec<u8> {
        self.ops.lock().unwrap().clone()
    }

    pub fn auth_values(&self) -> Vec<Vec<u8>> {
        self.auth_values.lock().unwrap().clone()
    }
}

fn serve(
    mut stream: TcpStream,
    config: NodeConfig,
    ops: Arc<Mutex<Vec<u8>>>,
    auth_values: Arc<Mutex<Vec<Vec<u8>>>>,
) {
    let NodeConfig {
        items,
        auth,
        mechs,
        mute,
    } = config;
    let mut store: HashMap<Vec<u8>, Item> = items.into_iter().collect();
    let mut authed = auth.is_none();
    let mut cas_counter: u64 = 1000;
    let mut inbuf: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        inbuf.extend_from_slice(&chunk[..n]);
        let mut out = GrowBuf::new();
        loop {
            let Some(need) = codec::frame_len(&inbuf) else { break };
            if inbuf.len() < need {
                break;
            }
            let frame: Vec<u8> = inbuf.drain(..need).collect();
            handle(
                &frame,
                &auth,
                &mechs,
                mute,
                &mut store,
                &mut authed,
                &mut cas_counter,
                &mut out,
                &ops,
                &auth_values,
            );
        }
        if !out.is_empty() && stream.write_all(out.as_slice()).is_err() {
            return;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle(
    frame: &[u8],
    auth: &Option<(String, String)>,
    mechs: &str,
    mute: bool,
    store: &mut HashMap<Vec<u8>, Item>,
    authed: &mut bool,
    cas_counter: &mut u64,
    out: &mut GrowBuf,
    ops: &Arc<Mutex<Vec<u8>>>,
    auth_values: &Arc<Mutex<Vec<Vec<u8>>>>,
) {
    let req = codec::parse_request(frame).expect("client sent a malformed frame");
    ops.lock().unwrap().push(req.opcode);
    if mute {
        return;
    }
    let op = Opcode::from_wire(req.opcode).expect("client sent an unknown opcode");

    let respond = |out: &mut GrowBuf, status: u16, cas: u64, extras: Extras, value: &[u8]| {
        codec::Response {
            opcode: op,
            status,
            opaque: req.opaque,
            cas,
            extras,
            key: &[],
            value,
        }
        .encode_into(out)
        .expect("encode scripted response");
    };

    match op {
        Opcode::SaslListMechs => {
            respond(out, codec::wire::SUCCESS, 0, Extras::None, mechs.as_bytes());
        }
        Opcode::SaslAuth => {
            auth_values.lock().unwrap().push(req.value.to_vec());
            let ok = match auth {
                Some((user, password)) => {
                    let mut expected = vec![0u8];
                    expected.extend_from_slice(user.as_bytes());
                    expected.push(0);
                    expected.extend_from_slice(password.as_bytes());
                    req.key == b"PLAIN" && req.value == expected.as_slice()
                }
                None => true,
            };
            if ok {
                *authed = true;
                respond(out, codec::wire::SUCCESS, 0, Extras::None, &[]);
            } else {
                respond(out, codec::wire::AUTH_ERROR, 0, Extras::None, &[]);
            }
        }
        Opcode::SaslStep => {
            respond(out, codec::wire::AUTH_ERROR, 0, Extras::None, &[]);
        }
        _ if !*authed => {
            // the client must not send data before authenticating
            respond(out, codec::wire::AUTH_ERROR, 0, Extras::None, &[]);
        }
        Opcode::Getq | Opcode::Gatq => {
            if let Some(item) = store.get(req.key) {
                respond(
                    out,
                    codec::wire::SUCCESS,
                    item.cas,
                    Extras::Flags { flags: item.flags },
                    &item.value.clone(),
                );
            }
            // silence on miss
        }
        Opcode::Noop => {
            respond(out, codec::wire::SUCCESS, 0, Extras::None, &[]);
        }
        Opcode::Set | Opcode::Add | Opcode::Replace => {
            let existing = store.get(req.key).map(|i| i.cas);
            let status = match op {
                Opcode::Add if existing.is_some() => codec::wire::KEY_EEXISTS,
                Opcode::Replace if existing.is_none() => codec::wire::KEY_ENOENT,
                _ if req.cas != 0 && existing != Some(req.cas) => codec::wire::KEY_EEXISTS,
                _ => codec::wire::SUCCESS,
            };
            if status == codec::wire::SUCCESS {
                let flags = u32::from_be_bytes([
                    req.extras[0],
                    req.extras[1],
                    req.extras[2],
                    req.extras[3],
                ]);
                *cas_counter += 1;
                store.insert(
                    req.key.to_vec(),
                    Item {
                        value: req.value.to_vec(),
                        flags,
                        cas: *cas_counter,
                    },
                );
                respond(out, status, *cas_counter, Extras::None, &[]);
            } else {
                respond(out, status, 0, Extras::None, &[]);
            }
        }
        Opcode::Append | Opcode::Prepend => {
            if let Some(item) = store.get_mut(req.key) {
                if op == Opcode::Append {
                    item.value.extend_from_slice(req.value);
                } else {
                    let mut value = req.value.to_vec();
                    value.extend_from_slice(&item.value);
                    item.value = value;
                }
                *cas_counter += 1;
                item.cas = *cas_counter;
                respond(out, codec::wire::SUCCESS, *cas_counter, Extras::None, &[]);
            } else {
                respond(out, codec::wire::NOT_STORED, 0, Extras::None, &[]);
            }
        }
        Opcode::Delete => {
            if store.remove(req.key).is_some() {
                respond(out, codec::wire::SUCCESS, 0, Extras::None, &[]);
            } else {
                respond(out, codec::wire::KEY_ENOENT, 0, Extras::None, &[]);
            }
        }
        Opcode::Increment | Opcode::Decrement => {
            let ex = req.extras;
            let delta = u64::from_be_bytes([ex[0], ex[1], ex[2], ex[3], ex[4], ex[5], ex[6], ex[7]]);
            let initial =
                u64::from_be_bytes([ex[8], ex[9], ex[10], ex[11], ex[12], ex[13], ex[14], ex[15]]);
            let expiry = u32::from_be_bytes([ex[16], ex[17], ex[18], ex[19]]);
            let current = store.get(req.key).map(|i| i.value.clone());
            match current {
                None => {
                    if expiry == 0xffff_ffff {
                        respond(out, codec::wire::KEY_ENOENT, 0, Extras::None, &[]);
                    } else {
                        *cas_counter += 1;
                        store.insert(
                            req.key.to_vec(),
                            Item {
                                value: initial.to_string().into_bytes(),
                                flags: 0,
                                cas: *cas_counter,
                            },
                        );
                        respond(
                            out,
                            codec::wire::SUCCESS,
                            *cas_counter,
                            Extras::None,
                            &initial.to_be_bytes(),
                        );
                    }
                }
                Some(value) => {
                    let parsed = std::str::from_utf8(&value)
                        .ok()
                        .and_then(|s| s.parse::<u64>().ok());
                    match parsed {
                        None => respond(out, codec::wire::DELTA_BADVAL, 0, Extras::None, &[]),
                        Some(current) => {
                            let next = if op == Opcode::Increment {
                                current.wrapping_add(delta)
                            } else {
                                current.saturating_sub(delta)
                            };
                            *cas_counter += 1;
                            store.insert(
                                req.key.to_vec(),
                                Item {
                                    value: next.to_string().into_bytes(),
                                    flags: 0,
                                    cas: *cas_counter,
                                },
                            );
                            respond(
                                out,
                                codec::wire::SUCCESS,
                                *cas_counter,
                                Extras::None,
                                &next.to_be_bytes(),
                            );
                        }
                    }
                }
            }
        }
        Opcode::TapConnect => {
            // replay stored items only when the client asked for a backfill,
            // in key order, then an opaque marker
            let flags = if req.extras.len() >= 4 {
                u32::from_be_bytes([req.extras[0], req.extras[1], req.extras[2], req.extras[3]])
            } else {
                0
            };
            let mut keys: Vec<Vec<u8>> = if flags & codec::TAP_CONNECT_BACKFILL != 0 {
                store.keys().cloned().collect()
            } else {
                Vec::new()
            };
            keys.sort();
            for key in keys {
                let item = store[&key].clone();
                codec::Request {
                    opcode: Opcode::TapMutation,
                    vbucket: 0,
                    opaque: 0,
                    cas: item.cas,
                    extras: Extras::TapItem {
                        flags: item.flags,
                        expiry: 0,
                    },
                    key: &key,
                    value: &item.value,
                }
                .encode_into(out)
                .expect("encode tap mutation");
            }
            codec::Request {
                opcode: Opcode::TapOpaque,
                vbucket: 0,
                opaque: 0,
                cas: 0,
                extras: Extras::None,
                key: &[],
                value: &[],
            }
            .encode_into(out)
            .expect("encode tap opaque");
        }
        _ => {}
    }
}

/// Callback events recorded for assertions.
#[derive(Debug, Default)]
pub struct Log {
    pub gets: Vec<(Status, Vec<u8>, Vec<u8>, u32, u64)>,
    pub stores: Vec<(Status, StorageOp, Vec<u8>, u64)>,
    pub counters: Vec<(Status, Vec<u8>, u64, u64)>,
    pub removes: Vec<(Status, Vec<u8>)>,
    pub tap_mutations: Vec<(Vec<u8>, Vec<u8>, u32, u32, u64)>,
}

#[derive(Clone, Default)]
pub struct Recorder(pub Rc<RefCell<Log>>);

impl Callbacks for Recorder {
    fn get(&mut self, status: Status, key: &[u8], value: &[u8], flags: u32, cas: u64) {
        self.0
            .borrow_mut()
            .gets
            .push((status, key.to_vec(), value.to_vec(), flags, cas));
    }

    fn store(&mut self, status: Status, op: StorageOp, key: &[u8], cas: u64) {
        self.0
            .borrow_mut()
            .stores
            .push((status, op, key.to_vec(), cas));
    }

    fn arithmetic(&mut self, status: Status, key: &[u8], value: u64, cas: u64) {
        self.0
            .borrow_mut()
            .counters
            .push((status, key.to_vec(), value, cas));
    }

    fn remove(&mut self, status: Status, key: &[u8]) {
        self.0.borrow_mut().removes.push((status, key.to_vec()));
    }

    fn tap_mutation(&mut self, key: &[u8], value: &[u8], flags: u32, expiry: u32, cas: u64) {
        self.0
            .borrow_mut()
            .tap_mutations
            .push((key.to_vec(), value.to_vec(), flags, expiry, cas));
    }
}
