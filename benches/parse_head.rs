use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use restive::parser::parse_head;

const REQ_SHORT: &[u8] = b"\
GET / HTTP/1.1\r\n\
Host: www.example.org\r\n\r\n";

const REQ_MED: &[u8] = b"\
POST /v1/pkg HTTP/1.1\r\n\
Accept: */*\r\n\
Accept-Encoding: gzip,deflate,br\r\n\
Accept-Language: en-US,en;q=0.5\r\n\
Cache-Control: no-cache\r\n\
Connection: keep-alive\r\n\
Content-Length: 669\r\n\
Host: www.example.org\r\n\
Pragma: no-cache\r\n\
Referrer: https://www.example.org\r\n\
User-Agent: Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/109.0\r\n\r\n";

const REQ_LONG: &[u8] = b"\
PUT /v1/pkg/archive HTTP/1.1\r\n\
Host: play.example.org\r\n\
User-Agent: Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/109.0\r\n\
Accept: */*\r\n\
Accept-Language: en-US,en;q=0.5\r\n\
Accept-Encoding: gzip, deflate, br\r\n\
Referer: https://www.example.org/\r\n\
Content-Type: application/x-www-form-urlencoded;charset=utf-8\r\n\
Content-Length: 669\r\n\
Origin: https://www.example.org\r\n\
DNT: 1\r\n\
Connection: keep-alive\r\n\
Cookie: 1P_JAR=2023-01-24-14; AEC=xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx; NID=xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx; OGPC=xxxxxxxxxxx\r\n\
Sec-Fetch-Dest: empty\r\n\
Sec-Fetch-Mode: cors\r\n\
Sec-Fetch-Site: same-site\r\n\
Pragma: no-cache\r\n\
Cache-Control: no-cache\r\n\
TE: trailers\r\n\r\n";

fn bench_parse_head(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_head");

    for (name, req) in [
        ("short", REQ_SHORT),
        ("medium", REQ_MED),
        ("long", REQ_LONG),
    ] {
        group.throughput(Throughput::Bytes(req.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), req, |b, req| {
            b.iter(|| parse_head(black_box(req)).expect("head parses"))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse_head);
criterion_main!(benches);
