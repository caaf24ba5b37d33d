//! App label to package name mapping for supported applications.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Mapping from app display labels (Chinese and English) to package names.
pub static APP_PACKAGES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();

    // Social & Messaging
    m.insert("微信", "com.tencent.mm");
    m.insert("WeChat", "com.tencent.mm");
    m.insert("QQ", "com.tencent.mobileqq");
    m.insert("微博", "com.sina.weibo");
    m.insert("Weibo", "com.sina.weibo");

    // E-commerce
    m.insert("淘宝", "com.taobao.taobao");
    m.insert("Taobao", "com.taobao.taobao");
    m.insert("京东", "com.jingdong.app.mall");
    m.insert("JD", "com.jingdong.app.mall");
    m.insert("拼多多", "com.xunmeng.pinduoduo");

    // Lifestyle & Social
    m.insert("小红书", "com.xingin.xhs");
    m.insert("豆瓣", "com.douban.frodo");
    m.insert("知乎", "com.zhihu.android");

    // Maps & Navigation
    m.insert("高德地图", "com.autonavi.minimap");
    m.insert("百度地图", "com.baidu.BaiduMap");

    // Food & Services
    m.insert("美团", "com.sankuai.meituan");
    m.insert("大众点评", "com.dianping.v1");
    m.insert("饿了么", "me.ele");

    // Travel
    m.insert("携程", "ctrip.android.view");
    m.insert("铁路12306", "com.MobileTicket");
    m.insert("12306", "com.MobileTicket");
    m.insert("滴滴出行", "com.sdu.did.psnger");

    // Video & Entertainment
    m.insert("bilibili", "tv.danmaku.bili");
    m.insert("抖音", "com.ss.android.ugc.aweme");
    m.insert("Douyin", "com.ss.android.ugc.aweme");
    m.insert("快手", "com.smile.gifmaker");
    m.insert("腾讯视频", "com.tencent.qqlive");
    m.insert("爱奇艺", "com.qiyi.video");
    m.insert("优酷视频", "com.youku.phone");

    // Music & Audio
    m.insert("网易云音乐", "com.netease.cloudmusic");
    m.insert("QQ音乐", "com.tencent.qqmusic");
    m.insert("喜马拉雅", "com.ximalaya.ting.android");

    // Productivity
    m.insert("飞书", "com.ss.android.lark");
    m.insert("QQ邮箱", "com.tencent.androidqqmail");

    // News & Information
    m.insert("腾讯新闻", "com.tencent.news");
    m.insert("今日头条", "com.ss.android.article.news");

    // System
    m.insert("设置", "com.android.settings");
    m.insert("Settings", "com.android.settings");
    m.insert("相机", "com.android.camera");
    m.insert("Chrome", "com.android.chrome");

    m
});

/// Resolve an app label to its package name.
pub fn get_package_name(label: &str) -> Option<&'static str> {
    APP_PACKAGES.get(label).copied()
}

/// Reverse lookup: find the display label for a package name.
pub fn get_app_label(package: &str) -> Option<&'static str> {
    APP_PACKAGES
        .iter()
        .find(|(_, pkg)| **pkg == package)
        .map(|(label, _)| *label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_chinese_and_english_label() {
        assert_eq!(get_package_name("微信"), Some("com.tencent.mm"));
        assert_eq!(get_package_name("WeChat"), Some("com.tencent.mm"));
        assert_eq!(get_package_name("NoSuchApp"), None);
    }

    #[test]
    fn test_reverse_lookup() {
        assert!(get_app_label("com.tencent.mm").is_some());
        assert_eq!(get_app_label("com.example.unknown"), None);
    }
}
