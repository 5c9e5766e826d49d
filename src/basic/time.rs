use crate::basic::var::GTime;
use chrono::{Datelike, Timelike, Utc};

const GPST0: [f64; 6] = [1980.0, 1.0, 6.0, 0.0, 0.0, 0.0];
const BDT0: [f64; 6] = [2006.0, 1.0, 1.0, 0.0, 0.0, 0.0];

// BDS week + 1356 = GPS week (BDS epoch 2006-01-01 UTC)
pub const BDS2GPS_WEEK: i32 = 1356;

// MJD of the GPS epoch 1980-01-06
const MJD_GPST0: i32 = 44244;

pub fn timestr_now() -> String {
    let now = Utc::now();
    format!(
        "{:04}{:02}{:02} {:02}{:02}{:02} UTC",
        now.year(),
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

pub fn timeadd(mut t: GTime, sec: f64) -> GTime {
    t.sec += sec;
    let tt = t.sec.floor();
    t.time += tt as i64;
    t.sec -= tt;
    t
}

pub fn timediff(t1: GTime, t2: GTime) -> f64 {
    (t1.time - t2.time) as f64 + (t1.sec - t2.sec)
}

pub fn epoch2time(ep: &[f64; 6]) -> GTime {
    const DOY: [i32; 12] = [1, 32, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335];

    let mut time = GTime { time: 0, sec: 0.0 };
    let year = ep[0] as i32;
    let mon = ep[1] as i32;
    let day = ep[2] as i32;

    if year < 1970 || year > 2099 || mon < 1 || mon > 12 {
        return time;
    }

    // leap year if year%4==0 in 1901-2099
    let days = (year - 1970) * 365 + (year - 1969) / 4 + DOY[(mon - 1) as usize] + day - 2
        + if year % 4 == 0 && mon >= 3 { 1 } else { 0 };

    let sec = ep[5].floor() as i32;
    time.time = (days as i64) * 86400 + (ep[3] as i64) * 3600 + (ep[4] as i64) * 60 + sec as i64;
    time.sec = ep[5] - sec as f64;

    time
}

pub fn time2epoch(t: GTime, ep: &mut [f64; 6]) {
    const MDAY: [i32; 48] = [
        31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31, 31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30,
        31, 31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31, 31, 28, 31, 30, 31, 30, 31, 31, 30, 31,
        30, 31,
    ];

    let days = (t.time / 86400) as i32;
    let sec = (t.time - (days as i64 * 86400)) as i32;
    let mut day = days % 1461;
    let mut mon = 0;

    while mon < 48 {
        if day >= MDAY[mon] {
            day -= MDAY[mon];
        } else {
            break;
        }
        mon += 1;
    }

    ep[0] = 1970.0 + (days / 1461 * 4) as f64 + (mon / 12) as f64;
    ep[1] = (mon % 12 + 1) as f64;
    ep[2] = (day + 1) as f64;
    ep[3] = (sec / 3600) as f64;
    ep[4] = (sec % 3600 / 60) as f64;
    ep[5] = (sec % 60) as f64 + t.sec;
}

pub fn gpst2time(week: i32, sec: f64) -> GTime {
    let mut t = epoch2time(&GPST0);
    let mut s = sec;
    if !(-1E9..=1E9).contains(&sec) {
        s = 0.0;
    }
    t.time += 86400 * 7 * week as i64 + s as i64;
    t.sec = s - s.floor();
    t
}

pub fn time2gpst(t: GTime, week: Option<&mut i32>) -> f64 {
    let t0 = epoch2time(&GPST0);
    let sec = t.time - t0.time;
    let w = (sec / (86400 * 7)) as i32;

    if let Some(week_ref) = week {
        *week_ref = w;
    }
    (sec - (w as i64 * 86400 * 7)) as f64 + t.sec
}

pub fn bdt2time(week: i32, sec: f64) -> GTime {
    let mut t = epoch2time(&BDT0);
    let mut s = sec;
    if !(-1E9..=1E9).contains(&sec) {
        s = 0.0;
    }
    t.time += 86400 * 7 * week as i64 + s as i64;
    t.sec = s - s.floor();
    t
}

pub fn time2bdt(t: GTime, week: Option<&mut i32>) -> f64 {
    let t0 = epoch2time(&BDT0);
    let sec = t.time - t0.time;
    let w = (sec / (86400 * 7)) as i32;
    if let Some(week_ref) = week {
        *week_ref = w;
    }
    (sec - (w as i64 * 86400 * 7)) as f64 + t.sec
}

pub fn time2str(t: GTime) -> String {
    let mut ep: [f64; 6] = [0.0; 6];
    let mut t = t;

    if 1.0 - t.sec < 0.5 {
        t.time += 1;
        t.sec = 0.0;
    }

    time2epoch(t, &mut ep);

    format!(
        "{:04}/{:02}/{:02} {:02}:{:02}:{:02}",
        ep[0], ep[1], ep[2], ep[3], ep[4], ep[5],
    )
}

/// (week, seconds-of-week) to (MJD, seconds-of-day)
pub fn wksow2mjd(week: i32, sow: f64) -> (i32, f64) {
    let total = sow + week as f64 * 604800.0;
    let mjd = (total / 86400.0) as i32 + MJD_GPST0;
    let sod = total % 86400.0;
    (mjd, sod)
}

/// (MJD, seconds-of-day) to (week, seconds-of-week)
pub fn mjd2wksow(mjd: i32, sod: f64) -> (i32, f64) {
    let total = (mjd - MJD_GPST0) as f64 * 86400.0 + sod;
    let week = (total / 604800.0) as i32;
    (week, total - week as f64 * 604800.0)
}

fn md_julday(iyear: i32, imonth: i32, iday: i32) -> i32 {
    const DOY_OF_MONTH: [i32; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];
    if iyear < 0 || imonth < 0 || imonth > 12 || iday < 0 || iday > 366 || (imonth != 0 && iday > 31)
    {
        return 0;
    }
    let iyr = if imonth <= 2 { iyear - 1 } else { iyear };
    let mut result = 365 * iyear - 678941 + iyr / 4 - iyr / 100 + iyr / 400 + iday;
    if imonth != 0 {
        result += DOY_OF_MONTH[(imonth - 1) as usize];
    }
    result
}

fn mjd2doy(jd: i32) -> (i32, i32) {
    let mut iyear = (jd + 678940) / 365;
    let mut idoy = jd - md_julday(iyear, 1, 1);
    while idoy <= 0 {
        iyear -= 1;
        idoy = jd - md_julday(iyear, 1, 1) + 1;
    }
    (iyear, idoy)
}

fn yeardoy2monthday(iyear: i32, idoy: i32) -> (i32, i32) {
    let mut days_in_month: [i32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    if (iyear % 4 == 0 && iyear % 100 != 0) || iyear % 400 == 0 {
        days_in_month[1] = 29;
    }
    let mut id = idoy;
    for (i, &dim) in days_in_month.iter().enumerate() {
        if id - dim > 0 {
            id -= dim;
            continue;
        }
        return (i as i32 + 1, id);
    }
    (12, 31)
}

/// MJD + seconds-of-day to civil (year, month, day, hour, min, sec)
pub fn mjd2date(jd: i32, sod: f64) -> (i32, i32, i32, i32, i32, f64) {
    let (iyear, idoy) = mjd2doy(jd);
    let (imonth, iday) = yeardoy2monthday(iyear, idoy);
    let ih = (sod / 3600.0) as i32;
    let imin = ((sod - ih as f64 * 3600.0) / 60.0) as i32;
    let sec = sod - ih as f64 * 3600.0 - imin as f64 * 60.0;
    (iyear, imonth, iday, ih, imin, sec)
}
