use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use astrocat_auth::{
    Action, ActionRequirements, AuthorizationGate, Caller, InMemorySessionStore, OwnedRecord, Principal,
    PrincipalId, RecordScope, ResourceContext, ResourceKind, Role, SecondFactorSessions, SessionId, SystemClock,
    grants,
};
use chrono::{Duration, Utc};

fn gate() -> (AuthorizationGate, Arc<SecondFactorSessions>) {
    let sessions = Arc::new(SecondFactorSessions::new(
        InMemorySessionStore::arc(),
        Duration::seconds(900),
    ));
    let gate = AuthorizationGate::new(ActionRequirements::standard(), sessions.clone(), Arc::new(SystemClock));
    (gate, sessions)
}

fn bench_authorize_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("authorize_latency");
    let (gate, sessions) = gate();

    let researcher = Caller::new(
        Principal::new(PrincipalId::new(), "rhea").with_role(Role::Researcher),
        SessionId::new(),
    );
    let admin = Caller::new(
        Principal::new(PrincipalId::new(), "ada")
            .with_role(Role::Admin)
            .with_grant(grants::MANAGE_ASTRONOMERS),
        SessionId::new(),
    );
    let root = Caller::new(Principal::new(PrincipalId::new(), "root").superuser(), SessionId::new());
    sessions.mark_verified(researcher.session_id, Utc::now()).ok();

    let ctx = ResourceContext::none();
    let cases = [
        ("superuser", &root, Action::Delete, ResourceKind::Observation),
        ("grant", &admin, Action::Create, ResourceKind::Astronomer),
        ("second_factor", &researcher, Action::Update, ResourceKind::Observation),
        ("unmapped", &researcher, Action::ListOwn, ResourceKind::Observatory),
    ];

    for (name, caller, action, kind) in cases {
        group.bench_function(name, |b| {
            b.iter(|| black_box(gate.authorize(Some(caller), action, kind, black_box(&ctx))))
        });
    }

    group.finish();
}

struct Record {
    owner: PrincipalId,
}

impl OwnedRecord for &Record {
    fn is_owned_by(&self, principal: PrincipalId) -> bool {
        self.owner == principal
    }
}

fn bench_record_scope_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_scope_filter");
    let owners: Vec<PrincipalId> = (0..16).map(|_| PrincipalId::new()).collect();
    let me = Principal::new(owners[0], "me").with_role(Role::Astronomer);
    let scope = RecordScope::for_principal(Some(&me), ResourceKind::Observation);

    for size in [100usize, 1_000, 10_000] {
        let records: Vec<Record> = (0..size)
            .map(|i| Record {
                owner: owners[i % owners.len()],
            })
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| black_box(scope.filter(records.iter())).len())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_authorize_latency, bench_record_scope_filter);
criterion_main!(benches);
