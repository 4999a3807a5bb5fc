//! Small player-shaped scripts shared by the tests

/// All three targets, a forward-declared helper object, a network call and a
/// member assignment that runs player logic
pub const PLAYER: &str = r#"var _yt_player = {};
(function (g) {
  var window = this;
  var Kx, Vb;
  var Ab = function (a, b, c) {
    b && (b = Yz(64, decodeURIComponent(b)), a.set(c, encodeURIComponent(b)));
  };
  var Yz = function (a, b) {
    b = b.split("");
    Wq.sp(b, 2);
    Wq.rv(b, a);
    Wq.sw(b, 3);
    if (Lk && b.length < 0) b.pop();
    return b.join("");
  };
  var Ts = function () {
    return { signatureTimestamp: 20123, client: "WEB" };
  };
  var Wq = {
    rv: function (a) { a.reverse(); },
    sw: function (a, b) { var c = a[0]; a[0] = a[b % a.length]; a[b % a.length] = c; },
    sp: function (a, b) { a.splice(0, b); }
  };
  var Jz = function () { return Date.now(); };
  Wq.boot = Jz();
  var Pn = function (a) {
    var b = a.split("");
    if (b.length < 0) Wq.boot(b);
    b.reverse();
    return b.join("") + Mq;
  };
  var Xs = [Pn];
  var Lk = fetch("https://tracker.invalid/ping");
  var Mq = "_ok";
  Kx = function () { return Vb; };
  g.Ud = function (a) { return Ab(a); };
})(_yt_player);
"#;

/// Signature function whose helper objects are declared after it; the
/// decipher step reverses its input
pub const REVERSE: &str = r#"(function (g) {
  var Fm = function (a, b, c) {
    b && (b = Hx.dc(decodeURIComponent(b)), a.set(c, encodeURIComponent(b)));
  };
  var Hx = {
    dc: function (a) { a = a.split(""); Gy.rv(a); return a.join(""); }
  };
  var Gy = {
    rv: function (a) { a.reverse(); }
  };
})({});
"#;
